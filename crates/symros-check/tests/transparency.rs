use rand::{seq::SliceRandom, Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use symros_check::{read_tags, InstrumentOptions, Instrumenter, ThresholdConfig};
use symros_ir::{
    run_function, verify_function, BinOp, BlockId, Constant, FloatPredicate, Function,
    InstBuilder, IntPredicate, Limits, Operand, RtValue, Type, ValueId, WrapFlags,
};

const INT_OPS: [BinOp; 13] = [
    BinOp::Add,
    BinOp::Sub,
    BinOp::Mul,
    BinOp::SDiv,
    BinOp::UDiv,
    BinOp::SRem,
    BinOp::URem,
    BinOp::And,
    BinOp::Or,
    BinOp::Xor,
    BinOp::Shl,
    BinOp::LShr,
    BinOp::AShr,
];

const FLOAT_OPS: [BinOp; 5] = [
    BinOp::FAdd,
    BinOp::FSub,
    BinOp::FMul,
    BinOp::FDiv,
    BinOp::FRem,
];

const INT_EDGES: [i32; 7] = [0, 1, -1, 2, 100, i32::MAX, i32::MIN];
const FLOAT_EDGES: [f64; 8] = [0.0, -0.0, 1.0, -1.5, 1e300, -1e300, f64::INFINITY, 0.5];

#[derive(Clone, Default)]
struct Pools {
    ints: Vec<ValueId>,
    floats: Vec<ValueId>,
}

fn gen_i32(rng: &mut ChaCha8Rng) -> i32 {
    if rng.gen_bool(0.4) {
        *INT_EDGES.choose(rng).unwrap()
    } else if rng.gen_bool(0.5) {
        rng.gen_range(-1000..1000)
    } else {
        rng.gen()
    }
}

fn gen_f64(rng: &mut ChaCha8Rng) -> f64 {
    if rng.gen_bool(0.4) {
        *FLOAT_EDGES.choose(rng).unwrap()
    } else {
        rng.gen_range(-1e6..1e6)
    }
}

fn gen_int_operand(rng: &mut ChaCha8Rng, pools: &Pools) -> Operand {
    if rng.gen_bool(0.75) {
        Operand::Value(*pools.ints.choose(rng).unwrap())
    } else {
        Constant::int(Type::I32, i64::from(gen_i32(rng))).into()
    }
}

fn gen_float_operand(rng: &mut ChaCha8Rng, pools: &Pools) -> Operand {
    if rng.gen_bool(0.75) {
        Operand::Value(*pools.floats.choose(rng).unwrap())
    } else {
        Constant::float(Type::F64, gen_f64(rng)).into()
    }
}

fn gen_straight_line(
    rng: &mut ChaCha8Rng,
    bld: &mut InstBuilder<'_>,
    pools: &mut Pools,
    max: usize,
) {
    for _ in 0..rng.gen_range(0..=max) {
        if rng.gen_bool(0.65) {
            let op = *INT_OPS.choose(rng).unwrap();
            let flags = match rng.gen_range(0..10) {
                0 => WrapFlags::NSW,
                1 => WrapFlags::NUW,
                _ => WrapFlags::empty(),
            };
            let lhs = gen_int_operand(rng, pools);
            let rhs = gen_int_operand(rng, pools);
            let (_, v) = bld.binary_inst(op, lhs, rhs, flags);
            pools.ints.push(v);
        } else {
            let op = *FLOAT_OPS.choose(rng).unwrap();
            let lhs = gen_float_operand(rng, pools);
            let rhs = gen_float_operand(rng, pools);
            let v = bld.binary(op, lhs, rhs);
            pools.floats.push(v);
        }
    }
}

/// A function over `(i32, i32, f64, f64) -> i32` with an optional diamond joined by phis.
fn gen_function(rng: &mut ChaCha8Rng, index: usize) -> Function {
    let mut f = Function::new(
        format!("rand{index}"),
        &[Type::I32, Type::I32, Type::F64, Type::F64],
        Some(Type::I32),
    );
    let mut pools = Pools {
        ints: vec![f.param(0), f.param(1)],
        floats: vec![f.param(2), f.param(3)],
    };
    let entry = f.entry;

    let mut bld = f.builder(entry);
    gen_straight_line(rng, &mut bld, &mut pools, 8);

    if rng.gen_bool(0.6) {
        let cond = if rng.gen_bool(0.5) {
            let lhs = gen_int_operand(rng, &pools);
            let rhs = gen_int_operand(rng, &pools);
            bld.icmp(IntPredicate::Slt, lhs, rhs)
        } else {
            let lhs = gen_float_operand(rng, &pools);
            let rhs = gen_float_operand(rng, &pools);
            bld.fcmp(FloatPredicate::Ogt, lhs, rhs)
        };
        let left = f.create_block("left");
        let right = f.create_block("right");
        let join = f.create_block("join");
        f.builder(entry).cond_br(cond, left, right);

        let mut arms: Vec<(BlockId, Operand, Operand)> = Vec::new();
        for arm in [left, right] {
            let mut arm_pools = pools.clone();
            let mut bld = f.builder(arm);
            gen_straight_line(rng, &mut bld, &mut arm_pools, 5);
            bld.br(join);
            let int = gen_int_operand(rng, &arm_pools);
            let float = gen_float_operand(rng, &arm_pools);
            arms.push((arm, int, float));
        }

        let mut bld = f.builder(join);
        let int_phi = bld.phi(Type::I32, arms.iter().map(|(b, i, _)| (*b, *i)).collect());
        let float_phi = bld.phi(Type::F64, arms.iter().map(|(b, _, x)| (*b, *x)).collect());
        pools.ints.push(int_phi);
        pools.floats.push(float_phi);
        gen_straight_line(rng, &mut bld, &mut pools, 6);
        let ret = gen_int_operand(rng, &pools);
        bld.ret(Some(ret));
    } else {
        let ret = gen_int_operand(rng, &pools);
        bld.ret(Some(ret));
    }
    f
}

fn gen_args(rng: &mut ChaCha8Rng) -> [RtValue; 4] {
    [
        RtValue::i32(gen_i32(rng)),
        RtValue::i32(gen_i32(rng)),
        RtValue::F64(gen_f64(rng)),
        RtValue::F64(gen_f64(rng)),
    ]
}

#[test]
fn instrumentation_is_semantically_transparent() {
    let mut rng = ChaCha8Rng::seed_from_u64(0x5EED);

    for index in 0..300 {
        let original = gen_function(&mut rng, index);
        verify_function(&original).unwrap();

        let threshold = ThresholdConfig::new(rng.gen_range(0.0..1e6)).unwrap();
        let mut instrumented = original.clone();
        let report = Instrumenter::new(&threshold, InstrumentOptions::default())
            .instrument_function(&mut instrumented);

        if let Err(err) = verify_function(&instrumented) {
            panic!("case {index}: {err}\n{instrumented}");
        }
        let added: usize = report.sites.iter().map(|s| 1 + s.checks.len()).sum();
        assert_eq!(instrumented.block_count(), original.block_count() + added);

        for _ in 0..8 {
            let args = gen_args(&mut rng);
            let before = run_function(&original, &args, Limits::default()).unwrap();
            let after = run_function(&instrumented, &args, Limits::default()).unwrap();
            assert_eq!(
                before.ret, after.ret,
                "case {index} args {args:?}\n{original}\n{instrumented}"
            );
        }
    }
}

#[test]
fn emitted_tags_round_trip() {
    let mut rng = ChaCha8Rng::seed_from_u64(0x5EED + 1);
    let threshold = ThresholdConfig::new(1000.0).unwrap();

    for index in 0..100 {
        let mut f = gen_function(&mut rng, index);
        let report = Instrumenter::new(&threshold, InstrumentOptions::default())
            .instrument_function(&mut f);

        let decoded = read_tags(&f).unwrap();
        assert_eq!(decoded.len(), report.checks.len());
        for (block, record) in report.checks.iter() {
            assert_eq!(decoded.get(&block), Some(&record.kind));
        }
    }
}

#[test]
fn disabling_families_only_removes_their_checks() {
    let mut rng = ChaCha8Rng::seed_from_u64(0x5EED + 2);
    let threshold = ThresholdConfig::new(10.0).unwrap();
    let int_only = InstrumentOptions {
        fp_checks: false,
        ..InstrumentOptions::default()
    };
    let fp_only = InstrumentOptions {
        int_checks: false,
        ..InstrumentOptions::default()
    };

    for index in 0..100 {
        let original = gen_function(&mut rng, index);

        let mut all = original.clone();
        let full = Instrumenter::new(&threshold, InstrumentOptions::default())
            .instrument_function(&mut all);
        let mut ints = original.clone();
        let int_report = Instrumenter::new(&threshold, int_only).instrument_function(&mut ints);
        let mut floats = original.clone();
        let fp_report = Instrumenter::new(&threshold, fp_only).instrument_function(&mut floats);

        assert!(int_report.checks.iter().all(|(_, r)| !r.kind.is_float()));
        assert!(fp_report.checks.iter().all(|(_, r)| r.kind.is_float()));
        assert_eq!(
            int_report.sites.len() + fp_report.sites.len(),
            full.sites.len()
        );
    }
}
