use nalgebra::Matrix4;

use crate::error::FrameGraphError;
use crate::io::Frame;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Visit {
    Unresolved,
    InProgress,
    Resolved,
}

/// Picks the root frame by case-insensitive name, or index 0 when no name is given.
pub fn resolve_reference_index(
    frames: &[Frame],
    reference: Option<&str>,
) -> Result<usize, FrameGraphError> {
    if frames.is_empty() {
        return Err(FrameGraphError::Empty);
    }
    let Some(name) = reference else {
        return Ok(0);
    };
    let wanted = name.to_lowercase();
    frames
        .iter()
        .position(|f| f.name.to_lowercase() == wanted)
        .ok_or_else(|| FrameGraphError::UnknownReference {
            name: name.to_string(),
            available: frames
                .iter()
                .map(|f| f.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        })
}

/// Composes every frame's `frame -> parent` matrix into a `frame -> root` matrix.
///
/// `to_root(root) = I` and `to_root(i) = to_root(parent(i)) * matrix(i)`.
/// Frames without a parent reference hang directly off the root.
/// Each chain is walked iteratively with an explicit in-progress marker, so a
/// reference loop surfaces as [`FrameGraphError::Cycle`] rather than a stack overflow.
pub fn build_effective_matrices(
    frames: &[Frame],
    root_index: usize,
) -> Result<Vec<Matrix4<f64>>, FrameGraphError> {
    let n = frames.len();
    if n == 0 {
        return Ok(Vec::new());
    }
    if root_index >= n {
        return Err(FrameGraphError::RootOutOfRange {
            root: root_index,
            len: n,
        });
    }

    let parents = normalize_parents(frames, root_index)?;

    let mut state = vec![Visit::Unresolved; n];
    let mut cache: Vec<Matrix4<f64>> = vec![Matrix4::identity(); n];
    state[root_index] = Visit::Resolved;

    for start in 0..n {
        // Walk up until reaching a resolved ancestor, then compose on the way back down.
        let mut chain = Vec::new();
        let mut current = start;
        while state[current] != Visit::Resolved {
            if state[current] == Visit::InProgress {
                return Err(FrameGraphError::Cycle { index: current });
            }
            state[current] = Visit::InProgress;
            chain.push(current);
            current = parents[current];
        }

        while let Some(i) = chain.pop() {
            cache[i] = cache[parents[i]] * frames[i].matrix;
            state[i] = Visit::Resolved;
        }
    }

    Ok(cache)
}

fn normalize_parents(frames: &[Frame], root_index: usize) -> Result<Vec<usize>, FrameGraphError> {
    let n = frames.len();
    frames
        .iter()
        .enumerate()
        .map(|(index, frame)| match frame.parent_ref {
            // the root's own reference is never followed
            _ if index == root_index => Ok(root_index),
            None => Ok(root_index),
            Some(parent) if parent >= 0 && (parent as usize) < n => Ok(parent as usize),
            Some(parent) => Err(FrameGraphError::InvalidParent {
                index,
                parent,
                len: n,
            }),
        })
        .collect()
}
