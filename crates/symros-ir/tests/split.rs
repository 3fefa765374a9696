use symros_ir::{
    run_function, verify_function, BinOp, BlockId, Constant, Function, InstKind, IntPredicate,
    Limits, RtValue, Terminator, Type, WrapFlags,
};

/// `entry: x = a + b; c = x < 0; br c, neg, join`, `neg: y = 0 - x; br join`,
/// `join: r = phi [x, entry], [y, neg]; ret r`.
fn abs_of_sum() -> Function {
    let mut f = Function::new("abs_of_sum", &[Type::I32, Type::I32], Some(Type::I32));
    let (a, b) = (f.param(0), f.param(1));
    let entry = f.entry;
    let neg = f.create_block("neg");
    let join = f.create_block("join");

    let mut bld = f.builder(entry);
    let x = bld.add(a, b);
    let c = bld.icmp(IntPredicate::Slt, x, Constant::zero(Type::I32));
    bld.cond_br(c, neg, join);

    let mut bld = f.builder(neg);
    let y = bld.sub(Constant::zero(Type::I32), x);
    bld.br(join);

    let mut bld = f.builder(join);
    let r = bld.phi(Type::I32, vec![(entry, x.into()), (neg, y.into())]);
    bld.ret(Some(r.into()));
    f
}

#[test]
fn split_moves_tail_and_repoints_phis() {
    let mut f = abs_of_sum();
    let entry = f.entry;
    let join = f.find_block("join").unwrap();
    let add = f.block(entry).insts[0].id;

    let (origin, cont) = f.split_block_after(add).unwrap();
    assert_eq!(origin, entry);
    assert_eq!(f.block(cont).name, "origin_cont");
    assert_eq!(f.layout[1], cont, "continuation sits right after its origin");

    assert_eq!(f.block(entry).insts.len(), 1);
    assert_eq!(
        f.block(entry).term.as_ref().unwrap().op,
        Terminator::Br { target: cont }
    );
    assert_eq!(f.block(cont).insts.len(), 1);
    assert!(matches!(
        f.block(cont).term.as_ref().unwrap().op,
        Terminator::CondBr { .. }
    ));

    let InstKind::Phi { incoming } = &f.block(join).insts[0].kind else {
        panic!("join must start with a phi");
    };
    assert!(incoming.iter().any(|(b, _)| *b == cont));
    assert!(incoming.iter().all(|(b, _)| *b != entry));

    verify_function(&f).unwrap();
}

#[test]
fn split_preserves_behaviour() {
    let original = abs_of_sum();
    let mut split = original.clone();
    let add = split.block(split.entry).insts[0].id;
    split.split_block_after(add).unwrap();

    for (a, b) in [(1, 2), (-5, 2), (i32::MAX, 1), (0, 0)] {
        let args = [RtValue::i32(a), RtValue::i32(b)];
        let before = run_function(&original, &args, Limits::default()).unwrap();
        let after = run_function(&split, &args, Limits::default()).unwrap();
        assert_eq!(before.ret, after.ret, "args ({a}, {b})");
    }
}

#[test]
fn split_before_terminator_yields_empty_continuation() {
    let mut f = Function::new("f", &[Type::I32], Some(Type::I32));
    let a = f.param(0);
    let entry = f.entry;
    let mut bld = f.builder(entry);
    let (add, sum) = bld.binary_inst(BinOp::Add, a, a, WrapFlags::empty());
    bld.ret(Some(sum.into()));

    let (_, cont) = f.split_block_after(add).unwrap();
    assert!(f.block(cont).insts.is_empty());
    assert!(matches!(
        f.block(cont).term.as_ref().unwrap().op,
        Terminator::Ret { .. }
    ));
    verify_function(&f).unwrap();
}

#[test]
fn split_without_split_point_is_a_no_op() {
    let mut f = Function::new("f", &[Type::I32], None);
    let a = f.param(0);
    let entry = f.entry;
    let (add, _) = f
        .builder(entry)
        .binary_inst(BinOp::Add, a, a, WrapFlags::empty());

    let before = f.clone();
    assert_eq!(f.split_block_after(add), None);
    assert_eq!(f, before);
}

#[test]
fn repeated_splits_get_unique_names() {
    let mut f = abs_of_sum();
    let entry = f.entry;
    let add = f.block(entry).insts[0].id;
    let cmp = f.block(entry).insts[1].id;

    let (_, first) = f.split_block_after(add).unwrap();
    let (origin, second) = f.split_block_after(cmp).unwrap();
    assert_eq!(origin, first);
    assert_eq!(f.block(first).name, "origin_cont");
    assert_eq!(f.block(second).name, "origin_cont1");
    assert_eq!(f.layout[..3], [entry, first, second]);
    verify_function(&f).unwrap();
}

#[test]
fn split_keeps_instruction_ids() {
    let mut f = abs_of_sum();
    let before = f.inst_ids();
    let cmp = f.block(f.entry).insts[1].id;

    f.split_block_after(cmp).unwrap();
    assert_eq!(f.inst_ids(), before);
}

#[test]
fn split_tolerates_a_dangling_successor() {
    let mut f = Function::new("f", &[Type::I32], Some(Type::I32));
    let a = f.param(0);
    let entry = f.entry;
    f.create_block("spare");
    let mut bld = f.builder(entry);
    let (add, _) = bld.binary_inst(BinOp::Add, a, a, WrapFlags::empty());
    bld.br(BlockId(7));

    let (origin, cont) = f.split_block_after(add).unwrap();
    assert_eq!(f.block(origin).successors(), vec![cont]);
    assert_eq!(f.block(cont).successors(), vec![BlockId(7)]);
}
