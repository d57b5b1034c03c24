extern crate classfile_decompiler;

use classfile_decompiler::decompile::expr::CompareOp;
use classfile_decompiler::decompile::simplify::{simplify, SimplifyLimits};
use classfile_decompiler::decompile::{Condition, Expr, LocalId};

fn flag(n: u32) -> Condition {
    Condition::test(Expr::Local(LocalId(n)))
}

fn below(n: u32, bound: i32) -> Condition {
    Condition::compare(CompareOp::Lt, Expr::Local(LocalId(n)), Expr::IntLiteral(bound))
}

/// Checks that two conditions agree on every assignment of `atoms`.
fn equivalent(a: &Condition, b: &Condition, atoms: &[Condition]) -> bool {
    (0u32..1 << atoms.len()).all(|mask| {
        let truth = |atom: &Condition| {
            atoms
                .iter()
                .position(|a| a == atom)
                .map(|i| mask >> i & 1 == 1)
                .unwrap_or(false)
        };
        a.evaluate(&truth) == b.evaluate(&truth)
    })
}

/// Small deterministic generator so the property runs over many shapes.
struct Shapes(u64);

impl Shapes {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    fn leaf(&mut self) -> Condition {
        let n = (self.next() % 4) as u32;
        let leaf = if n == 3 { below(3, 10) } else { flag(n) };
        if self.next() % 2 == 0 {
            leaf.invert()
        } else {
            leaf
        }
    }

    fn condition(&mut self, depth: u32) -> Condition {
        if depth == 0 || self.next() % 4 == 0 {
            return self.leaf();
        }
        let width = 2 + (self.next() % 2) as usize;
        let operands = (0..width).map(|_| self.condition(depth - 1)).collect();
        match self.next() % 3 {
            0 => Condition::and(operands),
            1 => Condition::or(operands),
            _ => Condition::Not(Box::new(Condition::or(operands))),
        }
    }
}

#[test]
fn test_simplify_preserves_truth_table() {
    let mut shapes = Shapes(0x5eed);
    for _ in 0..200 {
        let input = shapes.condition(3);
        let atoms = input.atoms();
        let output = simplify(&input, SimplifyLimits::default());
        assert!(equivalent(&input, &output, &atoms), "{:?} simplified to {:?}", input, output);
        assert!(output.atoms().iter().all(|a| atoms.contains(a)));
    }
}

#[test]
fn test_invert_negates_truth_table() {
    let mut shapes = Shapes(42);
    for _ in 0..100 {
        let input = shapes.condition(3);
        let atoms = input.atoms();
        let inverted = input.invert();
        let all_flipped = (0u32..1 << atoms.len()).all(|mask| {
            let truth = |atom: &Condition| {
                atoms
                    .iter()
                    .position(|a| a == atom)
                    .map(|i| mask >> i & 1 == 1)
                    .unwrap_or(false)
            };
            input.evaluate(&truth) != inverted.evaluate(&truth)
        });
        assert!(all_flipped, "{:?} inverted to {:?}", input, inverted);
        assert!(equivalent(&input, &inverted.invert(), &atoms));
    }
}

#[test]
fn test_inverse_comparison_is_one_atom() {
    let lt = below(0, 5);
    let ge = lt.invert();
    assert_eq!(ge.atoms(), vec![lt.clone()]);
    let both = Condition::and(vec![lt.clone(), flag(1), ge]);
    assert_eq!(both.atoms(), vec![lt, flag(1)]);
}

#[test]
fn test_short_circuit_chain_shapes() {
    let (a, b, c) = (flag(0), flag(1), flag(2));
    // a || (!a && b) || (!a && !b && c)
    let input = Condition::or(vec![
        a.clone(),
        Condition::and(vec![a.invert(), b.clone()]),
        Condition::and(vec![a.invert(), b.invert(), c.clone()]),
    ]);
    let output = simplify(&input, SimplifyLimits::default());
    assert_eq!(output, Condition::or(vec![a, b, c]));
}

#[test]
fn test_and_or_flatten() {
    let nested = Condition::and(vec![flag(0), Condition::and(vec![flag(1), flag(2)])]);
    assert_eq!(nested, Condition::And(vec![flag(0), flag(1), flag(2)]));
    assert_eq!(Condition::or(vec![flag(3)]), flag(3));
}

#[test]
fn test_absorption() {
    let (a, b) = (flag(0), flag(1));
    // a || (a && b)
    let input = Condition::or(vec![a.clone(), Condition::and(vec![a.clone(), b])]);
    assert_eq!(simplify(&input, SimplifyLimits::default()), a);
}

#[test]
fn test_consensus() {
    let (a, b) = (flag(0), below(1, 3));
    // a || (!a && b)
    let input = Condition::or(vec![a.clone(), Condition::and(vec![a.invert(), b.clone()])]);
    assert_eq!(simplify(&input, SimplifyLimits::default()), Condition::or(vec![a, b]));
}

#[test]
fn test_common_factor() {
    let (a, b) = (flag(0), flag(1));
    // (a && b) || (a && !b)
    let input = Condition::or(vec![
        Condition::and(vec![a.clone(), b.clone()]),
        Condition::and(vec![a.clone(), b.invert()]),
    ]);
    assert_eq!(simplify(&input, SimplifyLimits::default()), a);
}

#[test]
fn test_simplify_is_idempotent_on_reduced_forms() {
    let (a, b, c) = (flag(0), flag(1), flag(2));
    let inputs = vec![
        Condition::or(vec![a.clone(), Condition::and(vec![a.invert(), b.clone()])]),
        Condition::or(vec![
            Condition::and(vec![a.clone(), c.clone()]),
            Condition::and(vec![b.clone(), c.clone()]),
        ]),
        Condition::and(vec![a.clone(), Condition::or(vec![b.clone(), c.invert()])]),
    ];
    for input in inputs {
        let once = simplify(&input, SimplifyLimits::default());
        assert_eq!(simplify(&once, SimplifyLimits::default()), once);
    }
}

#[test]
fn test_simplify_is_idempotent() {
    let mut shapes = Shapes(0xc0ffee);
    for _ in 0..200 {
        let input = shapes.condition(3);
        let once = simplify(&input, SimplifyLimits::default());
        let twice = simplify(&once, SimplifyLimits::default());
        assert_eq!(twice, once, "{:?} did not settle", input);
    }
}
