//! Method bodies used across the integration tests

use outliner::ir::{
    BinopKind, DexType, InvokeKind, Method, MethodBuilder, MethodId, MethodRef, NumericType,
    Proto, TypeElement,
};
use outliner::Program;

fn reference(name: &str, return_type: DexType) -> MethodRef {
    MethodRef::new(
        DexType::class("fixture/Code"),
        name,
        Proto::new(return_type, vec![]),
    )
}

fn string_builder() -> DexType {
    DexType::class("java/lang/StringBuilder")
}

/// `new StringBuilder().append(x).append(y).toString()`, preceded by
/// `padding` unused int arguments so value numbering differs per method
pub fn string_builder_method(name: &str, padding: usize) -> Method {
    let sb_type = string_builder();
    let init = MethodRef::new(sb_type.clone(), "<init>", Proto::new(DexType::void(), vec![]));
    let append = MethodRef::new(
        sb_type.clone(),
        "append",
        Proto::new(sb_type.clone(), vec![DexType::string()]),
    );
    let to_string = MethodRef::new(sb_type.clone(), "toString", Proto::new(DexType::string(), vec![]));

    let mut builder = MethodBuilder::new(reference(name, DexType::string()));
    builder.set_position(Some(1));
    for _ in 0..padding {
        builder.argument(TypeElement::primitive(NumericType::Int));
    }
    let x = builder.argument(TypeElement::class(DexType::string()));
    let y = builder.argument(TypeElement::class(DexType::string()));
    let sb = builder.new_instance(sb_type);
    builder.invoke_discard(InvokeKind::Direct, init, &[sb]);
    let first = builder
        .invoke(InvokeKind::Virtual, append.clone(), &[sb, x])
        .expect("append returns the builder");
    let second = builder
        .invoke(InvokeKind::Virtual, append, &[first, y])
        .expect("append returns the builder");
    let result = builder.invoke(InvokeKind::Virtual, to_string, &[second]);
    builder.ret(result);
    builder.finish(MethodId(0))
}

/// `((a + b) * c) - a` over ints
pub fn arithmetic_method(name: &str, padding: usize) -> Method {
    let mut builder = MethodBuilder::new(reference(name, DexType::int()));
    for _ in 0..padding {
        builder.argument(TypeElement::class(DexType::string()));
    }
    let int = TypeElement::primitive(NumericType::Int);
    let a = builder.argument(int.clone());
    let b = builder.argument(int.clone());
    let c = builder.argument(int);
    let sum = builder.binop(BinopKind::Add, NumericType::Int, a, b);
    let product = builder.binop(BinopKind::Mul, NumericType::Int, sum, c);
    let result = builder.binop(BinopKind::Sub, NumericType::Int, product, a);
    builder.ret(Some(result));
    builder.finish(MethodId(0))
}

/// `(a + b + c)^2` over longs; the three inputs need six registers
pub fn wide_method(name: &str) -> Method {
    let mut builder = MethodBuilder::new(reference(name, DexType::long()));
    let long = TypeElement::primitive(NumericType::Long);
    let a = builder.argument(long.clone());
    let b = builder.argument(long.clone());
    let c = builder.argument(long);
    let sum = builder.binop(BinopKind::Add, NumericType::Long, a, b);
    let total = builder.binop(BinopKind::Add, NumericType::Long, sum, c);
    let squared = builder.binop(BinopKind::Mul, NumericType::Long, total, total);
    builder.ret(Some(squared));
    builder.finish(MethodId(0))
}

/// Arithmetic window inside a block covered by a catch handler, followed by
/// an unmodeled store
pub fn guarded_method(name: &str) -> Method {
    let mut builder = MethodBuilder::new(reference(name, DexType::void()));
    let handler = builder.new_block();
    builder.catch_handler(DexType::class("java/lang/ArithmeticException"), handler);
    let int = TypeElement::primitive(NumericType::Int);
    let a = builder.argument(int.clone());
    let b = builder.argument(int.clone());
    let c = builder.argument(int);
    let sum = builder.binop(BinopKind::Add, NumericType::Int, a, b);
    let quotient = builder.binop(BinopKind::Div, NumericType::Int, sum, c);
    let result = builder.binop(BinopKind::Rem, NumericType::Int, quotient, b);
    builder.other("sput", &[result], None);
    builder.ret(None);
    builder.switch_to(handler);
    builder.ret(None);
    builder.finish(MethodId(0))
}

/// Program holding `methods` in order
pub fn program_of(methods: impl IntoIterator<Item = Method>) -> Program {
    let mut program = Program::new();
    for method in methods {
        program.add_method(method);
    }
    program
}
