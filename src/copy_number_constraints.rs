//! Explicit linear constraint system over the clone copy number matrix
//!
//! The builder emits one `LinearConstraint` per (expression, relation, bound) tuple implied by the copy
//! number bound, the germline root row, the mate pair matrix and the breakpoint-segment matrix. The
//! constraint list is independent of any solver, and is used both to detect infeasible settings up front
//! through bound propagation, and to verify every copy number matrix the estimator returns.
//!

use itertools::Itertools;
use nalgebra::DMatrix;
use strum::{AsRefStr, EnumCount};

use crate::clone_model::{
    GERMLINE_BREAKPOINT_COPY_NUMBER, GERMLINE_SEGMENT_COPY_NUMBER, get_root_node_index,
};
use crate::solve_error::{SolveError, SolveResult};

/// Tolerance used when evaluating constraints and comparing propagated bounds
const CONSTRAINT_TOLERANCE: f64 = 1e-9;

/// Bound propagation stops after this many passes even if bounds are still tightening
const MAX_PROPAGATION_PASSES: usize = 1000;

/// One entry of the copy number matrix
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct CopyNumberVar {
    pub node: usize,
    pub locus: usize,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Relation {
    Equal,
    LessOrEqual,
}

#[derive(AsRefStr, Clone, Copy, Debug, EnumCount, Eq, PartialEq)]
pub enum ConstraintClass {
    CopyNumberBound,
    Germline,
    MatePair,
    BreakpointInSegment,
}

/// A linear constraint `sum(coefficient * var) <relation> bound`
#[derive(Clone, Debug)]
pub struct LinearConstraint {
    pub class: ConstraintClass,
    pub expression: Vec<(CopyNumberVar, f64)>,
    pub relation: Relation,
    pub bound: f64,
}

impl LinearConstraint {
    pub fn evaluate(&self, copy_number: &DMatrix<f64>) -> f64 {
        self.expression
            .iter()
            .map(|(var, coefficient)| coefficient * copy_number[(var.node, var.locus)])
            .sum()
    }

    pub fn is_satisfied(&self, copy_number: &DMatrix<f64>) -> bool {
        let value = self.evaluate(copy_number);
        match self.relation {
            Relation::Equal => (value - self.bound).abs() <= CONSTRAINT_TOLERANCE,
            Relation::LessOrEqual => value <= self.bound + CONSTRAINT_TOLERANCE,
        }
    }
}

/// Builds the complete constraint list for a copy number matrix
///
/// Copy number matrix rows are clone tree nodes with the root last, columns are all breakpoints followed
/// by all segments.
///
pub struct CopyNumberConstraintBuilder<'a> {
    breakpoint_segments: &'a DMatrix<f64>,
    mate_pairs: &'a DMatrix<f64>,
    node_count: usize,
    max_copy_number: u32,
}

impl<'a> CopyNumberConstraintBuilder<'a> {
    pub fn new(
        breakpoint_segments: &'a DMatrix<f64>,
        mate_pairs: &'a DMatrix<f64>,
        node_count: usize,
        max_copy_number: u32,
    ) -> Self {
        Self {
            breakpoint_segments,
            mate_pairs,
            node_count,
            max_copy_number,
        }
    }

    fn breakpoint_count(&self) -> usize {
        self.breakpoint_segments.nrows()
    }

    fn locus_count(&self) -> usize {
        self.breakpoint_segments.nrows() + self.breakpoint_segments.ncols()
    }

    /// Non-negativity and upper bound on every entry
    fn add_bound_constraints(&self, constraints: &mut Vec<LinearConstraint>) {
        for node in 0..self.node_count {
            for locus in 0..self.locus_count() {
                let var = CopyNumberVar { node, locus };
                constraints.push(LinearConstraint {
                    class: ConstraintClass::CopyNumberBound,
                    expression: vec![(var, -1.0)],
                    relation: Relation::LessOrEqual,
                    bound: 0.0,
                });
                constraints.push(LinearConstraint {
                    class: ConstraintClass::CopyNumberBound,
                    expression: vec![(var, 1.0)],
                    relation: Relation::LessOrEqual,
                    bound: self.max_copy_number as f64,
                });
            }
        }
    }

    fn add_germline_constraints(&self, constraints: &mut Vec<LinearConstraint>) {
        let node = get_root_node_index(self.node_count);
        for locus in 0..self.locus_count() {
            let bound = if locus < self.breakpoint_count() {
                GERMLINE_BREAKPOINT_COPY_NUMBER
            } else {
                GERMLINE_SEGMENT_COPY_NUMBER
            };
            constraints.push(LinearConstraint {
                class: ConstraintClass::Germline,
                expression: vec![(CopyNumberVar { node, locus }, 1.0)],
                relation: Relation::Equal,
                bound,
            });
        }
    }

    /// Equal copy number at both ends of each junction, for every clone
    fn add_mate_pair_constraints(&self, constraints: &mut Vec<LinearConstraint>) {
        let mate_pairs = (0..self.breakpoint_count())
            .tuple_combinations()
            .filter(|&(i, j)| self.mate_pairs[(i, j)] != 0.0);
        for (i, j) in mate_pairs {
            for node in 0..self.node_count {
                constraints.push(LinearConstraint {
                    class: ConstraintClass::MatePair,
                    expression: vec![
                        (CopyNumberVar { node, locus: i }, 1.0),
                        (CopyNumberVar { node, locus: j }, -1.0),
                    ],
                    relation: Relation::Equal,
                    bound: 0.0,
                });
            }
        }
    }

    /// Breakpoint copy number never exceeds the copy number of a segment containing it
    fn add_breakpoint_in_segment_constraints(&self, constraints: &mut Vec<LinearConstraint>) {
        let breakpoint_count = self.breakpoint_count();
        for breakpoint in 0..breakpoint_count {
            for segment in 0..self.breakpoint_segments.ncols() {
                if self.breakpoint_segments[(breakpoint, segment)] == 0.0 {
                    continue;
                }
                for node in 0..self.node_count {
                    constraints.push(LinearConstraint {
                        class: ConstraintClass::BreakpointInSegment,
                        expression: vec![
                            (
                                CopyNumberVar {
                                    node,
                                    locus: breakpoint,
                                },
                                1.0,
                            ),
                            (
                                CopyNumberVar {
                                    node,
                                    locus: breakpoint_count + segment,
                                },
                                -1.0,
                            ),
                        ],
                        relation: Relation::LessOrEqual,
                        bound: 0.0,
                    });
                }
            }
        }
    }

    pub fn build(&self) -> Vec<LinearConstraint> {
        let mut constraints = Vec::new();
        self.add_bound_constraints(&mut constraints);
        self.add_germline_constraints(&mut constraints);
        self.add_mate_pair_constraints(&mut constraints);
        self.add_breakpoint_in_segment_constraints(&mut constraints);
        constraints
    }
}

/// Count of constraints in each class, indexed by `ConstraintClass as usize`
pub fn get_constraint_class_counts(constraints: &[LinearConstraint]) -> [usize; ConstraintClass::COUNT] {
    let mut counts = [0; ConstraintClass::COUNT];
    for constraint in constraints.iter() {
        counts[constraint.class as usize] += 1;
    }
    counts
}

/// Integer bounds of one copy number entry
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VarBounds {
    pub lower: f64,
    pub upper: f64,
}

/// Tighten the bounds of every variable using one `expression <= bound` row
///
/// Returns true if any bound changed.
///
fn tighten_from_upper_row(
    expression: &[(CopyNumberVar, f64)],
    bound: f64,
    locus_count: usize,
    var_bounds: &mut [VarBounds],
) -> bool {
    let var_index = |var: &CopyNumberVar| var.node * locus_count + var.locus;

    // Minimum activity of each term, and the finite part of the total minimum activity:
    let min_activity = expression
        .iter()
        .map(|(var, coefficient)| {
            let b = var_bounds[var_index(var)];
            if *coefficient > 0.0 {
                coefficient * b.lower
            } else {
                coefficient * b.upper
            }
        })
        .collect::<Vec<_>>();
    let infinite_count = min_activity.iter().filter(|x| !x.is_finite()).count();
    let finite_sum = min_activity
        .iter()
        .filter(|x| x.is_finite())
        .sum::<f64>();

    let mut changed = false;
    for (term_index, (var, coefficient)) in expression.iter().enumerate() {
        let term_min = min_activity[term_index];
        let residual = if term_min.is_finite() {
            if infinite_count > 0 {
                continue;
            }
            bound - (finite_sum - term_min)
        } else {
            if infinite_count > 1 {
                continue;
            }
            bound - finite_sum
        };

        let b = &mut var_bounds[var_index(var)];
        let limit = residual / coefficient;
        if *coefficient > 0.0 {
            let upper = (limit + CONSTRAINT_TOLERANCE).floor();
            if upper < b.upper {
                b.upper = upper;
                changed = true;
            }
        } else {
            let lower = (limit - CONSTRAINT_TOLERANCE).ceil();
            if lower > b.lower {
                b.lower = lower;
                changed = true;
            }
        }
    }
    changed
}

/// Propagate integer variable bounds through the full constraint list
///
/// Returns the implied bounds of every copy number entry (indexed `node * locus_count + locus`), or an
/// `InfeasibleConstraints` error naming the constraint class which first produced an empty domain.
///
pub fn propagate_copy_number_bounds(
    constraints: &[LinearConstraint],
    node_count: usize,
    locus_count: usize,
) -> SolveResult<Vec<VarBounds>> {
    let mut var_bounds = vec![
        VarBounds {
            lower: f64::NEG_INFINITY,
            upper: f64::INFINITY,
        };
        node_count * locus_count
    ];

    for _ in 0..MAX_PROPAGATION_PASSES {
        let mut changed = false;
        for constraint in constraints.iter() {
            changed |= tighten_from_upper_row(
                &constraint.expression,
                constraint.bound,
                locus_count,
                &mut var_bounds,
            );
            if constraint.relation == Relation::Equal {
                let negated = constraint
                    .expression
                    .iter()
                    .map(|(var, coefficient)| (*var, -coefficient))
                    .collect::<Vec<_>>();
                changed |=
                    tighten_from_upper_row(&negated, -constraint.bound, locus_count, &mut var_bounds);
            }

            for (var, _) in constraint.expression.iter() {
                let b = var_bounds[var.node * locus_count + var.locus];
                if b.lower > b.upper {
                    return Err(SolveError::InfeasibleConstraints(format!(
                        "{} constraint leaves no valid copy number for clone node {} at locus {} (implied range {}..{})",
                        constraint.class.as_ref(),
                        var.node,
                        var.locus,
                        b.lower,
                        b.upper
                    )));
                }
            }
        }
        if !changed {
            break;
        }
    }

    Ok(var_bounds)
}

/// Find the first constraint violated by a copy number matrix
pub fn find_violated_constraint<'a>(
    constraints: &'a [LinearConstraint],
    copy_number: &DMatrix<f64>,
) -> Option<&'a LinearConstraint> {
    constraints.iter().find(|c| !c.is_satisfied(copy_number))
}
