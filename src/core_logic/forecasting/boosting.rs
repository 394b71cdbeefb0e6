use crate::error::{DashboardError, DashboardResult};
use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::seq::index::sample;
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoostingConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub num_leaves: usize,
    pub min_samples_leaf: usize,
    /// Fraction of rows drawn for each tree.
    pub subsample: f64,
    /// Fraction of features considered by each tree.
    pub colsample: f64,
    pub reg_alpha: f64,
    pub reg_lambda: f64,
}

impl Default for BoostingConfig {
    fn default() -> Self {
        BoostingConfig {
            n_estimators: 100,
            learning_rate: 0.05,
            max_depth: 6,
            num_leaves: 31,
            min_samples_leaf: 3,
            subsample: 0.8,
            colsample: 0.8,
            reg_alpha: 0.1,
            reg_lambda: 0.1,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn predict(&self, row: ArrayView1<f64>) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf(value) => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SplitInfo {
    feature: usize,
    threshold: f64,
    gain: f64,
}

struct Candidate {
    node: usize,
    rows: Vec<usize>,
    depth: usize,
    split: Option<SplitInfo>,
}

/// Gradient-boosted regression trees on squared loss. Trees grow leaf-wise:
/// the leaf with the largest gain is split next until `num_leaves` or
/// `max_depth` stops it.
#[derive(Debug, Clone)]
pub struct GradientBoosting {
    base: f64,
    trees: Vec<Tree>,
}

impl GradientBoosting {
    pub fn fit<R: Rng + ?Sized>(
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        config: &BoostingConfig,
        rng: &mut R,
    ) -> DashboardResult<Self> {
        let (rows, cols) = x.dim();
        if rows == 0 || rows != y.len() {
            return Err(DashboardError::Model(format!(
                "gradient boosting needs matching non-empty inputs, got {} rows and {} targets",
                rows,
                y.len()
            )));
        }
        if cols == 0 {
            return Err(DashboardError::Model(
                "gradient boosting needs at least one feature".to_string(),
            ));
        }

        let base = y.mean().unwrap_or(0.0);
        let mut predictions = Array1::from_elem(rows, base);
        let row_budget = fraction_of(rows, config.subsample);
        let col_budget = fraction_of(cols, config.colsample);
        // Small panels cannot honour the configured leaf size.
        let min_leaf = config.min_samples_leaf.min((rows / 10).max(1));

        let mut trees = Vec::with_capacity(config.n_estimators);
        for _ in 0..config.n_estimators {
            let gradients: Vec<f64> = predictions
                .iter()
                .zip(y.iter())
                .map(|(prediction, target)| prediction - target)
                .collect();
            let bag = sample(rng, rows, row_budget).into_vec();
            let features = sample(rng, cols, col_budget).into_vec();

            let tree = grow_tree(x, &gradients, bag, &features, config, min_leaf);
            for (row, prediction) in x.outer_iter().zip(predictions.iter_mut()) {
                *prediction += tree.predict(row);
            }
            trees.push(tree);
        }

        Ok(GradientBoosting { base, trees })
    }

    pub fn predict(&self, x: ArrayView2<f64>) -> Array1<f64> {
        x.outer_iter()
            .map(|row| {
                self.base
                    + self
                        .trees
                        .iter()
                        .map(|tree| tree.predict(row))
                        .sum::<f64>()
            })
            .collect()
    }
}

fn fraction_of(total: usize, fraction: f64) -> usize {
    ((total as f64 * fraction).round() as usize).clamp(1, total)
}

fn grow_tree(
    x: ArrayView2<f64>,
    gradients: &[f64],
    bag: Vec<usize>,
    features: &[usize],
    config: &BoostingConfig,
    min_leaf: usize,
) -> Tree {
    let mut nodes = vec![Node::Leaf(0.0)];
    let mut open = vec![Candidate {
        split: best_split(x, gradients, &bag, features, config, min_leaf, 0),
        node: 0,
        rows: bag,
        depth: 0,
    }];

    while open.len() < config.num_leaves {
        let pick = open
            .iter()
            .enumerate()
            .filter_map(|(i, candidate)| candidate.split.map(|split| (i, split)))
            .max_by(|a, b| a.1.gain.total_cmp(&b.1.gain));
        let Some((pick, split)) = pick else {
            break;
        };
        let candidate = open.swap_remove(pick);

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = candidate
            .rows
            .into_iter()
            .partition(|&row| x[[row, split.feature]] <= split.threshold);
        let left = nodes.len();
        let right = left + 1;
        nodes.push(Node::Leaf(0.0));
        nodes.push(Node::Leaf(0.0));
        nodes[candidate.node] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };

        let depth = candidate.depth + 1;
        for (node, rows) in [(left, left_rows), (right, right_rows)] {
            let split = best_split(x, gradients, &rows, features, config, min_leaf, depth);
            open.push(Candidate {
                node,
                rows,
                depth,
                split,
            });
        }
    }

    for candidate in open {
        let sum: f64 = candidate.rows.iter().map(|&row| gradients[row]).sum();
        let hessian = candidate.rows.len() as f64;
        let weight = -soft_threshold(sum, config.reg_alpha) / (hessian + config.reg_lambda);
        nodes[candidate.node] = Node::Leaf(config.learning_rate * weight);
    }
    Tree { nodes }
}

fn best_split(
    x: ArrayView2<f64>,
    gradients: &[f64],
    rows: &[usize],
    features: &[usize],
    config: &BoostingConfig,
    min_leaf: usize,
    depth: usize,
) -> Option<SplitInfo> {
    if depth >= config.max_depth || rows.len() < 2 * min_leaf {
        return None;
    }
    let total: f64 = rows.iter().map(|&row| gradients[row]).sum();
    let count = rows.len();
    let parent = leaf_score(total, count as f64, config);

    let mut best: Option<SplitInfo> = None;
    let mut order = rows.to_vec();
    for &feature in features {
        order.sort_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]));
        let mut left_sum = 0.0;
        for i in 0..count - 1 {
            left_sum += gradients[order[i]];
            let left_count = i + 1;
            let here = x[[order[i], feature]];
            let next = x[[order[i + 1], feature]];
            if left_count < min_leaf || count - left_count < min_leaf || here == next {
                continue;
            }
            let gain = leaf_score(left_sum, left_count as f64, config)
                + leaf_score(total - left_sum, (count - left_count) as f64, config)
                - parent;
            if gain > 1e-12 && best.map_or(true, |b| gain > b.gain) {
                best = Some(SplitInfo {
                    feature,
                    threshold: here + (next - here) / 2.0,
                    gain,
                });
            }
        }
    }
    best
}

fn soft_threshold(gradient_sum: f64, alpha: f64) -> f64 {
    gradient_sum.signum() * (gradient_sum.abs() - alpha).max(0.0)
}

fn leaf_score(gradient_sum: f64, hessian: f64, config: &BoostingConfig) -> f64 {
    let thresholded = soft_threshold(gradient_sum, config.reg_alpha);
    thresholded * thresholded / (hessian + config.reg_lambda)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn step_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((40, 2), |(i, j)| if j == 0 { i as f64 } else { (i % 7) as f64 });
        let y = Array1::from_shape_fn(40, |i| if i < 20 { 10.0 } else { 20.0 });
        (x, y)
    }

    #[test]
    fn test_learns_a_step_function() {
        let (x, y) = step_data();
        let mut rng = StdRng::seed_from_u64(42);
        let model = GradientBoosting::fit(x.view(), y.view(), &BoostingConfig::default(), &mut rng)
            .unwrap();

        // Rows next to the step can fall outside a tree's bag and get split
        // on the wrong side, so they only need to land on the right half.
        let predictions = model.predict(x.view());
        for (i, (prediction, target)) in predictions.iter().zip(y.iter()).enumerate() {
            assert_eq!(*prediction > 15.0, *target > 15.0, "row {}: {} vs {}", i, prediction, target);
            if !(18..=21).contains(&i) {
                assert!((prediction - target).abs() < 1.0, "row {}: {} vs {}", i, prediction, target);
            }
        }
    }

    #[test]
    fn test_same_seed_gives_same_model() {
        let (x, y) = step_data();
        let config = BoostingConfig::default();
        let first = GradientBoosting::fit(x.view(), y.view(), &config, &mut StdRng::seed_from_u64(9))
            .unwrap()
            .predict(x.view());
        let second = GradientBoosting::fit(x.view(), y.view(), &config, &mut StdRng::seed_from_u64(9))
            .unwrap()
            .predict(x.view());
        assert_eq!(first, second);
    }

    #[test]
    fn test_distinct_inputs_do_not_collapse_to_one_output() {
        let x = Array2::from_shape_fn((30, 1), |(i, _)| i as f64);
        let y = Array1::from_shape_fn(30, |i| 100.0 + 3.0 * i as f64);
        let mut rng = StdRng::seed_from_u64(1);
        let model = GradientBoosting::fit(x.view(), y.view(), &BoostingConfig::default(), &mut rng)
            .unwrap();
        let inputs = Array2::from_shape_vec((2, 1), vec![2.0, 27.0]).unwrap();
        let predictions = model.predict(inputs.view());
        assert!(predictions[1] > predictions[0] + 10.0);
    }

    #[test]
    fn test_constant_target_predicts_the_constant() {
        let x = Array2::from_shape_fn((12, 2), |(i, j)| (i * (j + 1)) as f64);
        let y = Array1::from_elem(12, 5.5);
        let mut rng = StdRng::seed_from_u64(3);
        let model = GradientBoosting::fit(x.view(), y.view(), &BoostingConfig::default(), &mut rng)
            .unwrap();
        for prediction in model.predict(x.view()).iter() {
            assert!((prediction - 5.5).abs() < 1e-9);
        }
    }

    #[test]
    fn test_soft_threshold_shrinks_towards_zero() {
        assert_eq!(soft_threshold(0.05, 0.1), 0.0);
        assert!((soft_threshold(1.0, 0.1) - 0.9).abs() < 1e-12);
        assert!((soft_threshold(-1.0, 0.1) + 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_empty_features() {
        let x = Array2::<f64>::zeros((4, 0));
        let y = Array1::from_elem(4, 1.0);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(GradientBoosting::fit(x.view(), y.view(), &BoostingConfig::default(), &mut rng).is_err());
    }
}
