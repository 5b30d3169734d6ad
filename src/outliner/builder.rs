//! Outline class synthesis.

use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use crate::ir::{DexType, Method, MethodBuilder, MethodId, MethodRef, TypeElement, ValueId};

use super::error::{OutlineError, OutlineResult};
use super::sites::TemplateId;
use super::template::{ArgumentSlot, Template, TemplateOperation};

/// Source file attribute of the holder
pub const OUTLINE_SOURCE_FILE: &str = "outline";

/// A generated outline method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedOutline {
    pub template_id: TemplateId,
    pub method: MethodRef,
}

/// Template -> generated method, fixed once the holder is built
pub type GeneratedOutlines = HashMap<Template, GeneratedOutline>;

/// The synthesized holder class with one static method per outline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedClass {
    pub ty: DexType,
    pub super_type: DexType,
    pub source_file: String,
    pub methods: Vec<Method>,
}

impl fmt::Display for SynthesizedClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "class {} extends {} (source: {})",
            self.ty, self.super_type, self.source_file
        )?;
        for method in &self.methods {
            write!(f, "{}", method)?;
        }
        Ok(())
    }
}

/// Build the holder from `selected`, which must already be in template
/// order. Methods are named `prefix0`, `prefix1`, ... and numbered from
/// `first_id`.
pub fn build_holder(
    holder: DexType,
    prefix: &str,
    selected: &[(TemplateId, Template)],
    first_id: MethodId,
) -> OutlineResult<(SynthesizedClass, GeneratedOutlines)> {
    debug_assert!(selected.windows(2).all(|w| w[0].1 < w[1].1));

    let mut methods = Vec::with_capacity(selected.len());
    let mut generated = GeneratedOutlines::with_capacity(selected.len());
    for (count, (template_id, template)) in selected.iter().enumerate() {
        let reference = MethodRef::new(
            holder.clone(),
            format!("{}{}", prefix, count),
            template.signature()?.clone(),
        );
        let id = MethodId(first_id.0 + count as u32);
        methods.push(synthesize(template, reference.clone(), id)?);
        debug!(outline = %reference, operations = template.operations().len(), "generated outline");
        generated.insert(
            template.clone(),
            GeneratedOutline {
                template_id: *template_id,
                method: reference,
            },
        );
    }

    let class = SynthesizedClass {
        ty: holder,
        super_type: DexType::object(),
        source_file: OUTLINE_SOURCE_FILE.to_string(),
        methods,
    };
    Ok((class, generated))
}

/// Body of an outline: read the arguments, replay every operation through
/// the single temporary and return it
pub fn synthesize(template: &Template, reference: MethodRef, id: MethodId) -> OutlineResult<Method> {
    let mismatch = |reason: &str| OutlineError::SignatureMismatch {
        template: template.to_string(),
        reason: reason.to_string(),
    };

    let mut builder = MethodBuilder::new(reference).outline();
    builder.set_position(Some(0));
    let mut arguments = Vec::with_capacity(template.argument_count());
    for ty in template.argument_types() {
        let lattice = TypeElement::from_dex_type(ty).ok_or_else(|| mismatch("void argument"))?;
        arguments.push(builder.argument(lattice));
    }

    let mut temporary: Option<ValueId> = None;
    let mut slots = template.argument_map().iter();
    for operation in template.operations() {
        let mut inputs = Vec::with_capacity(operation.number_of_inputs());
        for slot in slots.by_ref().take(operation.number_of_inputs()) {
            let value = match slot {
                ArgumentSlot::Temporary => temporary,
                ArgumentSlot::Argument(index) => arguments.get(*index as usize).copied(),
            };
            inputs.push(value.ok_or_else(|| mismatch("unresolved operand"))?);
        }

        let output = match operation {
            TemplateOperation::Binop { kind, numeric } => {
                let &[left, right] = inputs.as_slice() else {
                    return Err(mismatch("binop without two operands"));
                };
                Some(builder.binop(*kind, *numeric, left, right))
            }
            TemplateOperation::NewInstance { class } => Some(builder.new_instance(class.clone())),
            TemplateOperation::Invoke {
                method,
                kind,
                has_out_value: true,
            } => builder.invoke(*kind, method.clone(), &inputs),
            TemplateOperation::Invoke { method, kind, .. } => {
                builder.invoke_discard(*kind, method.clone(), &inputs);
                None
            }
        };
        if output.is_some() {
            temporary = output;
        }
    }

    if template.return_type().is_void() {
        builder.ret(None);
    } else {
        let value = temporary.ok_or_else(|| mismatch("no value to return"))?;
        builder.ret(Some(value));
    }
    Ok(builder.finish(id))
}
