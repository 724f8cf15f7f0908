//! # Optimal Assignment
//!
//! Minimum-cost one-to-one assignment (Kuhn-Munkres) between reference and
//! reconstructed trajectories.
//!
//! Rectangular inputs are padded to square. When assigning by similarity the
//! padding entries are dummy trajectories of zero similarity, so a real pair is
//! never worse than leaving both sides unmatched.

/// Solve the linear assignment problem for a rectangular cost matrix.
///
/// Missing cells (padding rows/columns, or short ragged rows) cost
/// `padding_cost`. Returns `(row, col)` pairs for real cells only, sorted by
/// row. Every row and every column appears at most once, and exactly
/// `min(rows, cols)` pairs are returned for a rectangular matrix.
///
/// # Algorithm
///
/// Classical O(n³) potential-based Hungarian method: each row is inserted by
/// finding a shortest augmenting path with Dijkstra-style potential updates.
///
/// # Example
/// ```
/// use trajectory_matcher::assignment::hungarian_assignment;
///
/// let cost = vec![vec![4.0, 1.0], vec![2.0, 8.0]];
/// assert_eq!(hungarian_assignment(&cost, 0.0), vec![(0, 1), (1, 0)]);
/// ```
pub fn hungarian_assignment(cost_matrix: &[Vec<f64>], padding_cost: f64) -> Vec<(usize, usize)> {
    let n_rows = cost_matrix.len();
    let n_cols = cost_matrix.iter().map(Vec::len).max().unwrap_or(0);
    if n_rows == 0 || n_cols == 0 {
        return vec![];
    }

    let n = n_rows.max(n_cols);
    let inf = f64::MAX / 2.0;

    let cost = |i: usize, j: usize| -> f64 {
        cost_matrix
            .get(i)
            .and_then(|row| row.get(j))
            .copied()
            .filter(|c| !c.is_nan())
            .unwrap_or(padding_cost)
    };

    // Potentials and matching, 1-indexed; column 0 is the virtual source
    let mut u = vec![0.0_f64; n + 1];
    let mut v = vec![0.0_f64; n + 1];
    let mut p = vec![0_usize; n + 1];
    let mut way = vec![0_usize; n + 1];

    for i in 1..=n {
        p[0] = i;
        let mut j0 = 0_usize;
        let mut min_val = vec![inf; n + 1];
        let mut used = vec![false; n + 1];

        loop {
            used[j0] = true;
            let i0 = p[j0];
            let mut delta = inf;
            let mut j1 = 0_usize;

            for j in 1..=n {
                if used[j] {
                    continue;
                }
                let reduced = cost(i0 - 1, j - 1) - u[i0] - v[j];
                if reduced < min_val[j] {
                    min_val[j] = reduced;
                    way[j] = j0;
                }
                if min_val[j] < delta {
                    delta = min_val[j];
                    j1 = j;
                }
            }

            for j in 0..=n {
                if used[j] {
                    u[p[j]] += delta;
                    v[j] -= delta;
                } else {
                    min_val[j] -= delta;
                }
            }

            j0 = j1;
            if p[j0] == 0 {
                break;
            }
        }

        // Augment along the path back to the source
        loop {
            p[j0] = p[way[j0]];
            j0 = way[j0];
            if j0 == 0 {
                break;
            }
        }
    }

    let mut assignments: Vec<(usize, usize)> = (1..=n)
        .filter(|&j| p[j] != 0)
        .map(|j| (p[j] - 1, j - 1))
        .filter(|&(row, col)| row < n_rows && col < n_cols)
        .collect();
    assignments.sort_unstable_by_key(|&(row, _)| row);
    assignments
}

/// Assignment maximizing total similarity.
///
/// Cost is `1 - similarity`; dummy padding has similarity 0 (cost 1). Pairs
/// are not filtered by any threshold here.
pub fn maximize_similarity(similarity: &[Vec<f64>]) -> Vec<(usize, usize)> {
    let cost: Vec<Vec<f64>> = similarity
        .iter()
        .map(|row| row.iter().map(|s| 1.0 - s).collect())
        .collect();
    hungarian_assignment(&cost, 1.0)
}
