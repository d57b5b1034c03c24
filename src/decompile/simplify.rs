//! Bounded sum-of-products simplification of branch conditions.
//!
//! The condition is expanded to a disjunction of conjunctive terms over
//! interned atoms, reduced with duplicate removal, absorption and consensus,
//! and rebuilt with common literals factored out. This is a heuristic, not a
//! minimizer. When a cap is exceeded, or the expansion is constant, the input
//! is returned unchanged.

use itertools::Itertools;
use tracing::trace;

use super::condition::Condition;

/// A conjunction of literals. A literal is `±(atom index + 1)`; a negative
/// literal is the inverse of the atom.
type Term = Vec<i32>;

/// Caps that bound the work done per condition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SimplifyLimits {
    /// Largest number of terms the expansion may produce.
    pub max_terms: usize,
    /// Largest number of reduction passes.
    pub max_iterations: usize,
}

impl Default for SimplifyLimits {
    fn default() -> Self {
        Self {
            max_terms: 64,
            max_iterations: 32,
        }
    }
}

#[derive(Default)]
struct Atoms {
    atoms: Vec<Condition>,
}

impl Atoms {
    fn literal(&mut self, leaf: &Condition) -> Option<i32> {
        let (atom, positive) = leaf.canonical()?;
        let index = match self.atoms.iter().position(|a| *a == atom) {
            Some(index) => index,
            None => {
                self.atoms.push(atom);
                self.atoms.len() - 1
            }
        };
        let literal = index as i32 + 1;
        Some(if positive { literal } else { -literal })
    }

    fn condition(&self, literal: i32) -> Condition {
        let atom = &self.atoms[(literal.unsigned_abs() - 1) as usize];
        if literal > 0 {
            atom.clone()
        } else {
            atom.invert()
        }
    }
}

/// Simplifies `condition`, or returns it unchanged when the limits are hit.
pub fn simplify(condition: &Condition, limits: SimplifyLimits) -> Condition {
    let mut atoms = Atoms::default();
    let mut terms = match expand(condition, &mut atoms, limits.max_terms) {
        Some(terms) => terms,
        None => {
            trace!(limit = limits.max_terms, "condition expansion over term cap");
            return condition.clone();
        }
    };
    if !reduce(&mut terms, limits.max_iterations) {
        trace!(limit = limits.max_iterations, "condition reduction over pass cap");
        return condition.clone();
    }
    if terms.is_empty() || terms.iter().any(|t| t.is_empty()) {
        return condition.clone();
    }
    build(&terms, &atoms)
}

fn expand(condition: &Condition, atoms: &mut Atoms, max_terms: usize) -> Option<Vec<Term>> {
    match condition {
        Condition::Or(operands) => {
            let mut terms = Vec::new();
            for operand in operands {
                terms.extend(expand(operand, atoms, max_terms)?);
                if terms.len() > max_terms {
                    return None;
                }
            }
            Some(terms)
        }
        Condition::And(operands) => {
            let mut terms: Vec<Term> = vec![Vec::new()];
            for operand in operands {
                let right = expand(operand, atoms, max_terms)?;
                if terms.len() * right.len() > max_terms {
                    return None;
                }
                terms = terms
                    .iter()
                    .cartesian_product(right.iter())
                    .filter_map(|(left, right)| conjoin(left, right))
                    .collect();
            }
            Some(terms)
        }
        Condition::Not(inner) => expand(&inner.invert(), atoms, max_terms),
        leaf => Some(vec![vec![atoms.literal(leaf)?]]),
    }
}

/// Conjunction of two terms, or `None` if it is contradictory.
fn conjoin(left: &Term, right: &Term) -> Option<Term> {
    let mut term = left.clone();
    for &literal in right {
        if term.contains(&-literal) {
            return None;
        }
        if !term.contains(&literal) {
            term.push(literal);
        }
    }
    Some(term)
}

fn is_subset(small: &[i32], large: &[i32]) -> bool {
    small.iter().all(|l| large.contains(l))
}

fn same_set(a: &[i32], b: &[i32]) -> bool {
    a.len() == b.len() && is_subset(a, b)
}

/// Runs reduction passes to a fixed point. Returns false if the pass cap was
/// reached first.
fn reduce(terms: &mut Vec<Term>, max_iterations: usize) -> bool {
    for _ in 0..max_iterations {
        let mut changed = dedupe(terms);
        changed |= absorb(terms);
        changed |= consensus(terms);
        if !changed {
            return true;
        }
    }
    false
}

fn dedupe(terms: &mut Vec<Term>) -> bool {
    let before = terms.len();
    let mut kept: Vec<Term> = Vec::with_capacity(before);
    for term in terms.drain(..) {
        if !kept.iter().any(|k| same_set(k, &term)) {
            kept.push(term);
        }
    }
    *terms = kept;
    terms.len() != before
}

/// Drops every term that contains all literals of another term.
fn absorb(terms: &mut Vec<Term>) -> bool {
    let absorbed: Vec<usize> = (0..terms.len())
        .filter(|&j| {
            (0..terms.len()).any(|i| i != j && terms[i].len() < terms[j].len() && is_subset(&terms[i], &terms[j]))
        })
        .collect();
    let mut index = 0;
    terms.retain(|_| {
        let keep = !absorbed.contains(&index);
        index += 1;
        keep
    });
    !absorbed.is_empty()
}

/// `(R1 ∧ x) ∨ (R2 ∧ ¬x)` with `R1 ⊆ R2` is `(R1 ∧ x) ∨ R2`.
fn consensus(terms: &mut [Term]) -> bool {
    let mut changed = false;
    for i in 0..terms.len() {
        for j in 0..terms.len() {
            if i == j {
                continue;
            }
            let found = terms[i].iter().copied().find(|&x| {
                terms[j].contains(&-x)
                    && terms[i]
                        .iter()
                        .filter(|&&l| l != x)
                        .all(|l| *l != -x && terms[j].contains(l))
            });
            if let Some(x) = found {
                terms[j].retain(|&l| l != -x);
                changed = true;
            }
        }
    }
    changed
}

fn conjunction(term: &[i32], atoms: &Atoms) -> Condition {
    Condition::and(term.iter().map(|&l| atoms.condition(l)).collect())
}

fn build(terms: &[Term], atoms: &Atoms) -> Condition {
    if let [only] = terms {
        return conjunction(only, atoms);
    }
    if let [first, second] = terms {
        let only_first: Vec<i32> = first.iter().copied().filter(|l| !second.contains(l)).collect();
        let only_second: Vec<i32> = second.iter().copied().filter(|l| !first.contains(l)).collect();
        if let ([l1], [l2]) = (only_first.as_slice(), only_second.as_slice()) {
            let shared: Vec<i32> = first.iter().copied().filter(|l| l != l1).collect();
            if !shared.is_empty() {
                let mut operands = vec![Condition::or(vec![atoms.condition(*l1), atoms.condition(*l2)])];
                operands.extend(shared.iter().map(|&l| atoms.condition(l)));
                return Condition::and(operands);
            }
        }
    }

    let counts = terms.iter().flatten().copied().counts();
    let best = counts.values().copied().max().unwrap_or(0);
    if best >= 2 {
        if let Some(factor) = terms.iter().flatten().copied().find(|l| counts[l] == best) {
            let (group, rest): (Vec<&Term>, Vec<&Term>) = terms.iter().partition(|t| t.contains(&factor));
            let remainders: Vec<Term> = group
                .iter()
                .map(|t| t.iter().copied().filter(|&l| l != factor).collect())
                .collect();
            let factored = if remainders.iter().any(|r: &Term| r.is_empty()) {
                atoms.condition(factor)
            } else {
                Condition::and(vec![atoms.condition(factor), build(&remainders, atoms)])
            };
            if rest.is_empty() {
                return factored;
            }
            let rest: Vec<Term> = rest.into_iter().cloned().collect();
            return Condition::or(vec![factored, build(&rest, atoms)]);
        }
    }

    Condition::or(terms.iter().map(|t| conjunction(t, atoms)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decompile::expr::{CompareOp, Expr};
    use crate::decompile::locals::LocalId;

    fn atom(n: u32) -> Condition {
        Condition::test(Expr::Local(LocalId(n)))
    }

    #[test]
    fn test_duplicate_paths_collapse() {
        let a = atom(0);
        let c = Condition::or(vec![a.clone(), a.clone()]);
        assert_eq!(simplify(&c, SimplifyLimits::default()), a);
    }

    #[test]
    fn test_relational_inverse_is_same_atom() {
        let lt = Condition::compare(CompareOp::Lt, Expr::Local(LocalId(0)), Expr::IntLiteral(5));
        let b = atom(1);
        // i < 5 || (i >= 5 && b)
        let c = Condition::or(vec![lt.clone(), Condition::and(vec![lt.invert(), b.clone()])]);
        assert_eq!(simplify(&c, SimplifyLimits::default()), Condition::or(vec![lt, b]));
    }

    #[test]
    fn test_shared_remainder_factoring() {
        let (a, b, c) = (atom(0), atom(1), atom(2));
        // (a && c) || (b && c)
        let input = Condition::or(vec![
            Condition::and(vec![a.clone(), c.clone()]),
            Condition::and(vec![b.clone(), c.clone()]),
        ]);
        let expected = Condition::and(vec![Condition::or(vec![a, b]), c]);
        assert_eq!(simplify(&input, SimplifyLimits::default()), expected);
    }

    #[test]
    fn test_term_cap_returns_input() {
        let operands: Vec<Condition> = (0..8)
            .map(|i| Condition::or(vec![atom(2 * i), atom(2 * i + 1)]))
            .collect();
        let input = Condition::and(operands);
        let limits = SimplifyLimits { max_terms: 16, max_iterations: 32 };
        assert_eq!(simplify(&input, limits), input);
    }

    #[test]
    fn test_tautology_returns_input() {
        let a = atom(0);
        let input = Condition::or(vec![a.clone(), a.invert()]);
        assert_eq!(simplify(&input, SimplifyLimits::default()), input);
    }
}
