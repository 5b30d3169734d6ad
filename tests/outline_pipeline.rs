//! End-to-end tests for the outlining pipeline
//!
//! Programs are either loaded from the demo TOML files or assembled from the
//! fixtures in `common`, then run through every pass.

mod common;

use common::*;
use outliner::ir::{DexType, InstrKind, Instruction, Method, MethodId, Proto, ValueId};
use outliner::{ConfigError, OutlineOptions, Outliner, Program};

fn outline_calls(method: &Method) -> Vec<&Instruction> {
    method
        .instructions()
        .filter(|i| matches!(&i.kind, InstrKind::Invoke { method, .. } if method.name.starts_with("outline$")))
        .collect()
}

fn listing(program: &Program) -> String {
    program.methods.iter().map(|m| m.to_string()).collect()
}

#[test]
fn test_demo_program_outlines_string_building() {
    let options = OutlineOptions::load(&demo_path("outline.toml")).expect("options load");
    let mut program = Program::load(&demo_path("program.toml")).expect("program loads");
    let checksum = program.method(MethodId(2)).clone();

    let mut outliner = Outliner::new(options).expect("outliner");
    let report = outliner.run(&mut program).expect("outlining succeeds");

    let holder = report.holder.expect("holder generated");
    assert_eq!(holder.ty, DexType::new("Ldemo/Outlines;"));
    assert_eq!(holder.super_type, DexType::object());
    assert_eq!(holder.source_file, "outline");
    assert_eq!(holder.methods.len(), 1);
    assert_eq!(
        holder.methods[0].reference.proto,
        Proto::new(DexType::string(), vec![DexType::string(), DexType::string()])
    );

    // greet, farewell, checksum, outline$0
    assert_eq!(program.methods.len(), 4);
    assert!(program.methods[3].is_outline);
    assert_eq!(program.methods[3].id, MethodId(3));

    let greet = outline_calls(&program.methods[0]);
    assert_eq!(greet.len(), 1);
    assert_eq!(greet[0].inputs.as_slice(), &[ValueId(0), ValueId(1)]);
    assert_eq!(greet[0].output, Some(ValueId(5)));
    assert_eq!(greet[0].position, Some(12));

    let farewell = outline_calls(&program.methods[1]);
    assert_eq!(farewell.len(), 1);
    assert_eq!(farewell[0].inputs.as_slice(), &[ValueId(1), ValueId(2)]);
    assert_eq!(farewell[0].position, Some(30));

    assert_eq!(program.methods[2], checksum);
    assert!(program.validate().is_ok());
}

#[test]
fn test_demo_statistics() {
    let options = OutlineOptions::load(&demo_path("outline.toml")).expect("options load");
    let mut program = Program::load(&demo_path("program.toml")).expect("program loads");
    let mut outliner = Outliner::new(options).expect("outliner");
    let stats = outliner.run(&mut program).expect("outlining succeeds").stats;

    assert_eq!(stats.methods_scanned, 3);
    assert_eq!(stats.candidates, 3);
    assert_eq!(stats.templates, 2);
    assert_eq!(stats.methods_selected, 2);
    assert_eq!(stats.sites, 2);
    assert_eq!(stats.outlines, 1);
    assert_eq!(stats.sites_rewritten, 2);
    assert_eq!(stats.instructions_removed, 8);
    assert!(stats.has_changes());
    assert!(stats.to_string().contains("sites rewritten:       2"));
}

#[test]
fn test_wide_arguments_respect_register_budget() {
    let mut program = program_of((0..4).map(|i| wide_method(&format!("wide{}", i))));
    let mut outliner = Outliner::new(test_options(2, 2)).expect("outliner");
    let holder = outliner
        .run(&mut program)
        .expect("outlining succeeds")
        .holder
        .expect("holder generated");

    assert_eq!(holder.methods.len(), 1);
    let proto = &holder.methods[0].reference.proto;
    assert_eq!(proto.parameters, vec![DexType::long(), DexType::long()]);
    assert_eq!(proto.return_type, DexType::long());
    let registers: usize = proto.parameters.iter().map(DexType::required_registers).sum();
    assert!(registers <= 5);

    for method in &program.methods[..4] {
        // The first addition could not join the window
        let names: Vec<String> = method.instructions().map(|i| i.name()).collect();
        assert_eq!(
            names,
            vec!["argument", "argument", "argument", "add-long", "invoke-static", "return"]
        );
    }
}

#[test]
fn test_guarded_blocks_are_split_after_the_call() {
    let mut program = program_of([guarded_method("first"), guarded_method("second")]);
    let mut outliner = Outliner::new(test_options(3, 2)).expect("outliner");
    let report = outliner.run(&mut program).expect("outlining succeeds");
    assert_eq!(report.stats.sites_rewritten, 2);

    for method in &program.methods[..2] {
        assert_eq!(method.blocks.len(), 3);
        let head = &method.blocks[0];
        let tail = &method.blocks[2];
        let last_two: Vec<String> = head.instructions[head.instructions.len() - 2..]
            .iter()
            .map(|i| i.name())
            .collect();
        assert_eq!(last_two, vec!["invoke-static", "goto"]);
        assert_eq!(head.successors, vec![tail.id]);
        assert_eq!(tail.catch_handlers, head.catch_handlers);
        assert!(method.validate().is_ok());
    }
}

#[test]
fn test_output_is_independent_of_thread_count() {
    let methods: Vec<Method> = (0..40)
        .map(|i| match i % 4 {
            0 => arithmetic_method(&format!("a{}", i), i % 3),
            1 => wide_method(&format!("w{}", i)),
            2 => guarded_method(&format!("g{}", i)),
            _ => string_builder_method(&format!("s{}", i), i % 5),
        })
        .collect();

    let render = |threads: usize| {
        let mut program = program_of(methods.clone());
        let options = OutlineOptions {
            threads,
            ..test_options(2, 5)
        };
        let mut outliner = Outliner::new(options).expect("outliner");
        let report = outliner.run(&mut program).expect("outlining succeeds");
        let holder = report.holder.map(|h| h.to_string()).unwrap_or_default();
        (holder, listing(&program), report.stats)
    };

    let single = render(1);
    let parallel = render(8);
    assert!(single.0.contains("outline$3"));
    assert_eq!(single, parallel);
}

#[test]
fn test_rewritten_program_has_nothing_left_to_outline() {
    let mut program = program_of((0..6).map(|i| string_builder_method(&format!("s{}", i), i)));
    let mut first = Outliner::new(test_options(3, 2)).expect("outliner");
    first.run(&mut program).expect("first run");
    let after_first = program.clone();

    let mut second = Outliner::new(test_options(3, 2)).expect("outliner");
    let report = second.run(&mut program).expect("second run");
    assert!(report.holder.is_none());
    assert!(!report.stats.has_changes());
    assert_eq!(program, after_first);
}

#[test]
fn test_options_file_overrides_defaults() {
    let options = OutlineOptions::load(&demo_path("outline.toml")).expect("options load");
    assert_eq!(options.method_threshold, 2);
    assert_eq!(options.site_threshold, 2);
    assert_eq!(options.holder_type, DexType::new("Ldemo/Outlines;"));
    assert_eq!(options.threads, 2);

    let aliased = OutlineOptions::parse_toml(
        "[outline]\nminWindowSize = 4\nsiteFrequencyThreshold = 7\nthreads = 1\n",
    )
    .expect("camelCase keys parse");
    assert_eq!(aliased.min_size, 4);
    assert_eq!(aliased.site_threshold, 7);
    assert_eq!(aliased.method_threshold, OutlineOptions::default().method_threshold);
}

#[test]
fn test_inconsistent_options_are_rejected() {
    let err = OutlineOptions::parse_toml("[outline]\nmin_size = 5\nmax_size = 3\nthreads = 1\n")
        .unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));

    let err = OutlineOptions::parse_toml("[outline]\nmin_size = \"three\"\n").unwrap_err();
    assert!(matches!(err, ConfigError::Parse { what: "options", .. }));
}

#[test]
fn test_missing_files_report_io_errors() {
    let err = Program::load(&demo_path("does-not-exist.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
    assert!(err.to_string().starts_with("Failed to read"));
    assert!(std::error::Error::source(&err).is_some());
}
