//! Rewriting pass: replace recorded windows with outline calls.
//!
//! A method is scanned over its unmodified body first, collecting one edit
//! per window whose template has a generated outline. Edits are applied
//! afterwards, block by block, so window indices always refer to the body
//! the site pass saw.

use std::collections::HashMap;

use itertools::Itertools;
use tracing::{debug, trace};

use crate::ir::{BlockId, DefUse, InstrKind, Instruction, InvokeKind, Method, Operands, ValueId};

use super::builder::GeneratedOutlines;
use super::classify::{classify, InstructionClass};
use super::error::{OutlineError, OutlineResult};
use super::scanner::{scan_method, Candidate, CandidateHandler, WindowLimits};
use super::sites::{Site, SiteTable};
use super::types::OutlineCounters;

/// Replacement of window `[start, end)` by `call`
#[derive(Debug, Clone)]
struct Edit {
    block: BlockId,
    start: usize,
    end: usize,
    call: Instruction,
}

/// Rewriting pass handler for one method
struct CallSiteRewriter<'a> {
    generated: &'a GeneratedOutlines,
    sites: &'a SiteTable,
    method: &'a Method,
    edits: Vec<Edit>,
}

impl CandidateHandler for CallSiteRewriter<'_> {
    fn on_candidate(&mut self, candidate: Candidate) -> OutlineResult<()> {
        let Some(outline) = self.generated.get(&candidate.template) else {
            return Ok(());
        };

        let site = Site::of(self.method.id, &candidate);
        if !self.sites.remove_site(outline.template_id, &site) {
            return Err(OutlineError::SiteNotFound {
                method: self.method.reference.clone(),
                block: candidate.block,
                start: candidate.start,
                end: candidate.end,
            });
        }

        let window = &self.method.block(candidate.block).instructions[candidate.start..candidate.end];
        let position = window
            .iter()
            .filter(|instruction| !classify(instruction).is_transparent())
            .find_map(|instruction| instruction.position);
        let output = if outline.method.proto.return_type.is_void() {
            None
        } else {
            candidate.return_value
        };
        debug_assert_eq!(candidate.arguments.len(), outline.method.proto.parameters.len());

        trace!(
            method = %self.method.reference,
            block = candidate.block.0,
            start = candidate.start,
            end = candidate.end,
            outline = %outline.method.name,
            "rewriting site"
        );
        let call = Instruction::new(
            InstrKind::Invoke {
                kind: InvokeKind::Static,
                method: outline.method.clone(),
                relocatable: false,
            },
            candidate.arguments.iter().copied().collect(),
            output,
        )
        .with_position(position);

        self.edits.push(Edit {
            block: candidate.block,
            start: candidate.start,
            end: candidate.end,
            call,
        });
        Ok(())
    }
}

/// Replace every window of `method` that has a generated outline
pub(crate) fn rewrite_method(
    method: &mut Method,
    generated: &GeneratedOutlines,
    sites: &SiteTable,
    limits: &WindowLimits,
    counters: &OutlineCounters,
) -> OutlineResult<()> {
    let def_use = method.def_use();
    let mut rewriter = CallSiteRewriter {
        generated,
        sites,
        method: &*method,
        edits: Vec::new(),
    };
    scan_method(method, &def_use, limits, &mut rewriter)?;
    let edits = rewriter.edits;
    if edits.is_empty() {
        return Ok(());
    }

    let rewritten = edits.len();
    let removed = apply_edits(method, &def_use, edits);
    debug!(
        method = %method.reference,
        sites = rewritten,
        removed,
        "rewrote method"
    );
    OutlineCounters::add(&counters.sites_rewritten, rewritten);
    OutlineCounters::add(&counters.instructions_removed, removed);
    Ok(())
}

/// Apply edits in block order. Returns the net number of removed
/// instructions.
fn apply_edits(method: &mut Method, def_use: &DefUse, edits: Vec<Edit>) -> usize {
    let mut replacements: HashMap<ValueId, ValueId> = HashMap::new();
    let mut removed = 0;
    for (block, group) in &edits.into_iter().chunk_by(|edit| edit.block) {
        removed += rewrite_block(method, block, group.collect(), def_use, &mut replacements);
    }

    // Refinements removed with a window are replaced by the value they refine
    if !replacements.is_empty() {
        for block in &mut method.blocks {
            for instruction in &mut block.instructions {
                for input in instruction.inputs.iter_mut() {
                    if let Some(&root) = replacements.get(input) {
                        *input = root;
                    }
                }
            }
        }
    }
    removed
}

fn rewrite_block(
    method: &mut Method,
    id: BlockId,
    edits: Vec<Edit>,
    def_use: &DefUse,
    replacements: &mut HashMap<ValueId, ValueId>,
) -> usize {
    let split = method.block(id).has_catch_handlers();
    let old = std::mem::take(&mut method.block_mut(id).instructions);

    let mut segments: Vec<Vec<Instruction>> = Vec::new();
    let mut segment = Vec::with_capacity(old.len());
    let mut removed = 0;
    let mut edits = edits.into_iter().peekable();
    let mut current: Option<Edit> = None;

    for (index, instruction) in old.into_iter().enumerate() {
        if current.is_none() && edits.peek().is_some_and(|edit| edit.start == index) {
            current = edits.next();
        }
        let Some(end) = current.as_ref().map(|edit| edit.end) else {
            segment.push(instruction);
            continue;
        };

        if index + 1 == end {
            // The call takes the place of the last operation
            debug_assert!(classify(&instruction).is_operation());
            if let Some(edit) = current.take() {
                segment.push(edit.call);
            }
            if split {
                segments.push(std::mem::take(&mut segment));
            }
            continue;
        }
        match classify(&instruction) {
            InstructionClass::Const => segment.push(instruction),
            InstructionClass::Passthrough => {
                if let Some(output) = instruction.output {
                    replacements.insert(output, def_use.aliased(output));
                }
                removed += 1;
            }
            _ => removed += 1,
        }
    }
    if !segment.is_empty() || segments.is_empty() {
        segments.push(segment);
    }

    let mut segments = segments.into_iter();
    method.block_mut(id).instructions = segments.next().unwrap_or_default();
    let rest: Vec<Vec<Instruction>> = segments.collect();
    if rest.is_empty() {
        return removed;
    }

    // Keep each outline call alone at the end of a handler-covered block
    let successors = std::mem::take(&mut method.block_mut(id).successors);
    let handlers = method.block(id).catch_handlers.clone();
    let mut current_block = id;
    for instructions in rest {
        let next = method.add_block();
        let block = method.block_mut(next);
        block.instructions = instructions;
        block.catch_handlers = handlers.clone();

        let previous = method.block_mut(current_block);
        previous
            .instructions
            .push(Instruction::new(InstrKind::Goto, Operands::new(), None));
        previous.successors = vec![next];
        current_block = next;
    }
    method.block_mut(current_block).successors = successors;
    removed
}
