//! Linear builder for method bodies.

use smallvec::smallvec;

use super::instruction::{
    BinopKind, BlockId, ConstValue, InstrKind, Instruction, InvokeKind, MethodId, Operands,
    ValueId,
};
use super::method::{Block, CatchHandler, Method};
use super::types::{DexType, MethodRef, NumericType, TypeElement};

/// Builder for constructing method bodies
///
/// Instructions are appended to the current block, starting with block 0.
#[derive(Debug)]
pub struct MethodBuilder {
    method: Method,
    current: BlockId,
    position: Option<u32>,
    arguments: u32,
}

impl MethodBuilder {
    pub fn new(reference: MethodRef) -> Self {
        Self {
            method: Method {
                id: MethodId(0),
                reference,
                values: Vec::new(),
                blocks: vec![Block::new(BlockId(0))],
                is_outline: false,
            },
            current: BlockId(0),
            position: None,
            arguments: 0,
        }
    }

    /// Mark the method as a synthesized outline
    pub fn outline(mut self) -> Self {
        self.method.is_outline = true;
        self
    }

    /// Source position attached to subsequently emitted instructions
    pub fn set_position(&mut self, position: Option<u32>) {
        self.position = position;
    }

    #[inline]
    pub fn current_block(&self) -> BlockId {
        self.current
    }

    fn emit(&mut self, kind: InstrKind, inputs: Operands, output: Option<TypeElement>) -> Option<ValueId> {
        let output = output.map(|ty| self.method.add_value(ty));
        let instruction = Instruction::new(kind, inputs, output).with_position(self.position);
        self.method
            .block_mut(self.current)
            .instructions
            .push(instruction);
        output
    }

    fn emit_value(&mut self, kind: InstrKind, inputs: Operands, ty: TypeElement) -> ValueId {
        let value = self.method.add_value(ty);
        let instruction = Instruction::new(kind, inputs, Some(value)).with_position(self.position);
        self.method
            .block_mut(self.current)
            .instructions
            .push(instruction);
        value
    }

    /// Next method argument
    pub fn argument(&mut self, ty: TypeElement) -> ValueId {
        let index = self.arguments;
        self.arguments += 1;
        self.emit_value(InstrKind::Argument { index }, Operands::new(), ty)
    }

    pub fn constant(&mut self, value: ConstValue, ty: TypeElement) -> ValueId {
        self.emit_value(InstrKind::Const { value }, Operands::new(), ty)
    }

    pub fn const_int(&mut self, value: i64) -> ValueId {
        self.constant(ConstValue::Int(value), TypeElement::primitive(NumericType::Int))
    }

    pub fn const_string(&mut self, value: &str) -> ValueId {
        self.constant(
            ConstValue::String(value.to_string()),
            TypeElement::class(DexType::string()),
        )
    }

    /// Type refinement of `input`; the result has the same lattice type
    pub fn assume(&mut self, input: ValueId) -> ValueId {
        let ty = self.method.value_type(input).clone();
        self.emit_value(InstrKind::Assume, smallvec![input], ty)
    }

    pub fn binop(&mut self, kind: BinopKind, numeric: NumericType, left: ValueId, right: ValueId) -> ValueId {
        self.emit_value(
            InstrKind::Binop { kind, numeric },
            smallvec![left, right],
            TypeElement::primitive(numeric),
        )
    }

    pub fn new_instance(&mut self, class: DexType) -> ValueId {
        let ty = TypeElement::class(class.clone());
        self.emit_value(InstrKind::NewInstance { class }, Operands::new(), ty)
    }

    /// Relocatable invoke. Produces a value unless the method returns void.
    pub fn invoke(&mut self, kind: InvokeKind, method: MethodRef, arguments: &[ValueId]) -> Option<ValueId> {
        self.emit_invoke(kind, method, arguments, true, true)
    }

    /// Relocatable invoke whose result (if any) is discarded
    pub fn invoke_discard(&mut self, kind: InvokeKind, method: MethodRef, arguments: &[ValueId]) {
        self.emit_invoke(kind, method, arguments, true, false);
    }

    /// Invoke that inlining-constraint analysis says must stay in its method
    pub fn invoke_pinned(&mut self, kind: InvokeKind, method: MethodRef, arguments: &[ValueId]) -> Option<ValueId> {
        self.emit_invoke(kind, method, arguments, false, true)
    }

    fn emit_invoke(
        &mut self,
        kind: InvokeKind,
        method: MethodRef,
        arguments: &[ValueId],
        relocatable: bool,
        keep_result: bool,
    ) -> Option<ValueId> {
        let output = if keep_result {
            TypeElement::from_dex_type(&method.proto.return_type)
        } else {
            None
        };
        self.emit(
            InstrKind::Invoke {
                kind,
                method,
                relocatable,
            },
            arguments.iter().copied().collect(),
            output,
        )
    }

    /// Unmodeled instruction
    pub fn other(&mut self, name: &str, inputs: &[ValueId], output: Option<TypeElement>) -> Option<ValueId> {
        self.emit(
            InstrKind::Other {
                name: name.to_string(),
            },
            inputs.iter().copied().collect(),
            output,
        )
    }

    pub fn ret(&mut self, value: Option<ValueId>) {
        self.emit(InstrKind::Return, value.into_iter().collect(), None);
    }

    /// End the current block with a jump to `target`
    pub fn goto(&mut self, target: BlockId) {
        self.emit(InstrKind::Goto, Operands::new(), None);
        self.method.block_mut(self.current).successors.push(target);
    }

    pub fn new_block(&mut self) -> BlockId {
        self.method.add_block()
    }

    pub fn switch_to(&mut self, block: BlockId) {
        self.current = block;
    }

    /// Guard the current block with a handler for `guard`
    pub fn catch_handler(&mut self, guard: DexType, target: BlockId) {
        self.method
            .block_mut(self.current)
            .catch_handlers
            .push(CatchHandler { guard, target });
    }

    pub fn finish(self, id: MethodId) -> Method {
        let mut method = self.method;
        method.id = id;
        method
    }
}
