#![cfg(feature = "serde")]

extern crate classfile_decompiler;

use classfile_decompiler::code_attribute::{Instruction, MethodCode};
use classfile_decompiler::constant_info::MethodRef;
use classfile_decompiler::decompile::{self, DecompiledClass, MethodOutcome, Statement};
use classfile_decompiler::{ClassAccessFlags, ClassInfo, MethodAccessFlags, MethodInfo};

fn sample_class() -> ClassInfo {
    let looped = MethodCode::sequential(vec![
        Instruction::Iconst0,
        Instruction::Istore(1),
        Instruction::Iload(1),
        Instruction::Iload(0),
        Instruction::IfIcmpge(4),
        Instruction::Invokestatic(MethodRef::new("Sample", "tick", "()V")),
        Instruction::Iinc { index: 1, value: 1 },
        Instruction::Goto(-5),
        Instruction::Return,
    ]);
    ClassInfo {
        name: "Sample".into(),
        super_name: Some("java/lang/Object".into()),
        access_flags: ClassAccessFlags::PUBLIC,
        methods: vec![
            MethodInfo {
                name: "repeat".into(),
                descriptor: "(I)V".into(),
                access_flags: MethodAccessFlags::STATIC,
                code: Some(looped),
            },
            MethodInfo {
                name: "tick".into(),
                descriptor: "()V".into(),
                access_flags: MethodAccessFlags::STATIC,
                code: Some(MethodCode::sequential(vec![Instruction::Return])),
            },
            MethodInfo {
                name: "broken".into(),
                descriptor: "()V".into(),
                access_flags: MethodAccessFlags::STATIC,
                code: Some(MethodCode::sequential(vec![Instruction::Ret(0)])),
            },
        ],
    }
}

#[test]
fn test_decompiled_class_survives_json() {
    let decompiled = decompile::decompile(&sample_class());
    let repeat = decompiled.method("repeat").and_then(|m| m.outcome.body()).unwrap();
    assert!(matches!(repeat.body.statements[0], Statement::For { .. }));
    assert!(matches!(decompiled.method("broken").unwrap().outcome, MethodOutcome::Failed(_)));

    let json = serde_json::to_string(&decompiled).unwrap();
    let restored: DecompiledClass = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, decompiled);
}
