use super::expr::{CompareOp, Expr};
use super::locals::LocalId;

/// A boolean condition guarding a branch or loop.
///
/// `Not` is only produced for conditions handed in from outside; inversion
/// of every other variant is pushed inward (De Morgan), so nesting does not
/// grow when a condition is inverted.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Condition {
    /// `expr` (or `!expr` when `negated`) for a boolean-valued expression.
    Test { expr: Expr, negated: bool },
    Compare { op: CompareOp, left: Expr, right: Expr },
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    pub fn test(expr: Expr) -> Self {
        Condition::Test { expr, negated: false }
    }

    pub fn compare(op: CompareOp, left: Expr, right: Expr) -> Self {
        Condition::Compare { op, left, right }
    }

    /// Conjunction that collapses single operands and flattens nested `And`s.
    pub fn and(operands: Vec<Condition>) -> Self {
        Self::join(operands, true)
    }

    /// Disjunction that collapses single operands and flattens nested `Or`s.
    pub fn or(operands: Vec<Condition>) -> Self {
        Self::join(operands, false)
    }

    fn join(operands: Vec<Condition>, conjunction: bool) -> Self {
        let mut flat = Vec::with_capacity(operands.len());
        for operand in operands {
            match operand {
                Condition::And(inner) if conjunction => flat.extend(inner),
                Condition::Or(inner) if !conjunction => flat.extend(inner),
                other => flat.push(other),
            }
        }
        if flat.len() == 1 {
            if let Some(only) = flat.pop() {
                return only;
            }
        }
        if conjunction {
            Condition::And(flat)
        } else {
            Condition::Or(flat)
        }
    }

    /// Logical negation.
    pub fn invert(&self) -> Condition {
        match self {
            Condition::Test { expr, negated } => Condition::Test {
                expr: expr.clone(),
                negated: !negated,
            },
            Condition::Compare { op, left, right } => Condition::Compare {
                op: op.negate(),
                left: left.clone(),
                right: right.clone(),
            },
            Condition::And(operands) => Condition::Or(operands.iter().map(Condition::invert).collect()),
            Condition::Or(operands) => Condition::And(operands.iter().map(Condition::invert).collect()),
            Condition::Not(inner) => (**inner).clone(),
        }
    }

    /// Splits an atomic condition into its positive form and polarity, so
    /// `a >= b` and `a < b` name the same atom with opposite signs.
    pub fn canonical(&self) -> Option<(Condition, bool)> {
        match self {
            Condition::Test { expr, negated } => Some((Condition::test(expr.clone()), !negated)),
            Condition::Compare { op, left, right } => {
                let positive = op.is_canonical();
                let op = if positive { *op } else { op.negate() };
                Some((Condition::compare(op, left.clone(), right.clone()), positive))
            }
            _ => None,
        }
    }

    /// Distinct atoms in first-occurrence order, in canonical form.
    pub fn atoms(&self) -> Vec<Condition> {
        let mut atoms = Vec::new();
        self.collect_atoms(&mut atoms);
        atoms
    }

    fn collect_atoms(&self, atoms: &mut Vec<Condition>) {
        match self {
            Condition::And(operands) | Condition::Or(operands) => {
                for operand in operands {
                    operand.collect_atoms(atoms);
                }
            }
            Condition::Not(inner) => inner.collect_atoms(atoms),
            leaf => {
                if let Some((atom, _)) = leaf.canonical() {
                    if !atoms.contains(&atom) {
                        atoms.push(atom);
                    }
                }
            }
        }
    }

    /// Evaluates the condition given the truth value of every canonical atom.
    pub fn evaluate(&self, truth: &dyn Fn(&Condition) -> bool) -> bool {
        match self {
            Condition::And(operands) => operands.iter().all(|c| c.evaluate(truth)),
            Condition::Or(operands) => operands.iter().any(|c| c.evaluate(truth)),
            Condition::Not(inner) => !inner.evaluate(truth),
            leaf => match leaf.canonical() {
                Some((atom, polarity)) => truth(&atom) == polarity,
                None => false,
            },
        }
    }

    /// Every expression operand, left to right.
    pub fn exprs(&self) -> Vec<&Expr> {
        match self {
            Condition::Test { expr, .. } => vec![expr],
            Condition::Compare { left, right, .. } => vec![left, right],
            Condition::And(operands) | Condition::Or(operands) => {
                operands.iter().flat_map(Condition::exprs).collect()
            }
            Condition::Not(inner) => inner.exprs(),
        }
    }

    pub fn reads_local(&self, id: LocalId) -> bool {
        self.exprs().iter().any(|e| e.reads_local(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(n: u32) -> Expr {
        Expr::Local(LocalId(n))
    }

    #[test]
    fn test_invert_compare_and_test() {
        let lt = Condition::compare(CompareOp::Lt, local(0), Expr::IntLiteral(5));
        assert_eq!(
            lt.invert(),
            Condition::compare(CompareOp::Ge, local(0), Expr::IntLiteral(5))
        );
        let t = Condition::test(local(1));
        assert_eq!(t.invert(), Condition::Test { expr: local(1), negated: true });
    }

    #[test]
    fn test_invert_pushes_negation_inward() {
        let c = Condition::and(vec![Condition::test(local(0)), Condition::test(local(1))]);
        match c.invert() {
            Condition::Or(operands) => {
                assert_eq!(operands.len(), 2);
                assert!(operands.iter().all(|o| matches!(o, Condition::Test { negated: true, .. })));
            }
            other => panic!("expected Or, got {:?}", other),
        }
        let wrapped = Condition::Not(Box::new(Condition::test(local(2))));
        assert_eq!(wrapped.invert(), Condition::test(local(2)));
    }

    #[test]
    fn test_canonical_atoms_match_inverse_compares() {
        let ge = Condition::compare(CompareOp::Ge, local(0), local(1));
        let lt = Condition::compare(CompareOp::Lt, local(0), local(1));
        let (a, pa) = ge.canonical().unwrap();
        let (b, pb) = lt.canonical().unwrap();
        assert_eq!(a, b);
        assert!(!pa);
        assert!(pb);
    }

    #[test]
    fn test_join_flattens() {
        let a = Condition::test(local(0));
        let b = Condition::test(local(1));
        let c = Condition::test(local(2));
        let nested = Condition::or(vec![a.clone(), Condition::or(vec![b.clone(), c.clone()])]);
        assert_eq!(nested, Condition::Or(vec![a.clone(), b, c]));
        assert_eq!(Condition::and(vec![a.clone()]), a);
    }
}
