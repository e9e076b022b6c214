use tracing::debug;

use crate::io::{
    Assignment, AssignmentDocument, ElectrodeCatalog, ElectrodeModel, TipAt, Trajectory,
};

pub const DEFAULT_TOLERANCE_MM: f64 = 5.0;
const TIE_EPS: f64 = 1e-6;

#[derive(Debug, Clone, Copy)]
struct Candidate<'a> {
    id: &'a str,
    delta: f64,
    length: f64,
    contacts: usize,
}

impl Candidate<'_> {
    /// Strict tie-break order: smaller delta, more contacts, shorter model, smaller id.
    fn beats(&self, best: &Candidate<'_>) -> bool {
        if self.delta < best.delta - TIE_EPS {
            return true;
        }
        if (self.delta - best.delta).abs() > TIE_EPS {
            return false;
        }
        if self.contacts != best.contacts {
            return self.contacts > best.contacts;
        }
        if self.length < best.length - TIE_EPS {
            return true;
        }
        if (self.length - best.length).abs() > TIE_EPS {
            return false;
        }
        self.id < best.id
    }
}

fn select_best<'a, I>(trajectory_length: f64, models: I, tolerance_mm: f64) -> Option<String>
where
    I: Iterator<Item = &'a ElectrodeModel>,
{
    let mut best: Option<Candidate<'a>> = None;
    for model in models {
        let length = model.exploration_length_mm();
        let delta = (length - trajectory_length).abs();
        if delta > tolerance_mm + TIE_EPS {
            continue;
        }
        let candidate = Candidate {
            id: &model.id,
            delta,
            length,
            contacts: model.contact_count,
        };
        if best.map_or(true, |b| candidate.beats(&b)) {
            best = Some(candidate);
        }
    }
    best.map(|b| b.id.to_string())
}

/// Best catalog model for a trajectory length, or `None` when nothing is within tolerance.
pub fn suggest_model_id(
    trajectory_length: f64,
    catalog: &ElectrodeCatalog,
    tolerance_mm: f64,
) -> Option<String> {
    select_best(trajectory_length, catalog.iter(), tolerance_mm)
}

/// Same as [`suggest_model_id`] restricted to `candidate_ids`; unknown ids are ignored.
pub fn suggest_model_id_among(
    trajectory_length: f64,
    catalog: &ElectrodeCatalog,
    candidate_ids: &[&str],
    tolerance_mm: f64,
) -> Option<String> {
    select_best(
        trajectory_length,
        candidate_ids.iter().filter_map(|id| catalog.get(id)),
        tolerance_mm,
    )
}

/// One assignment row per trajectory carrying the suggested model, or an empty id.
pub fn suggest_assignments(
    trajectories: &[Trajectory],
    catalog: &ElectrodeCatalog,
    tolerance_mm: f64,
    tip_at: TipAt,
) -> AssignmentDocument {
    let rows = trajectories
        .iter()
        .map(|t| {
            let length = t.length();
            let model_id = suggest_model_id(length, catalog, tolerance_mm).unwrap_or_default();
            if model_id.is_empty() {
                debug!(
                    trajectory = %t.name,
                    length_mm = length,
                    "no electrode model within tolerance"
                );
            }
            Assignment::new(t.name.clone(), model_id).with_tip_at(tip_at)
        })
        .collect();
    AssignmentDocument::new(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::{
        dummy_catalog, dummy_model, evenly_spaced_offsets, straight_trajectory,
    };

    fn abc_catalog() -> ElectrodeCatalog {
        dummy_catalog(vec![
            dummy_model("A", 40.0, &evenly_spaced_offsets(10, 3.5)),
            dummy_model("B", 42.0, &evenly_spaced_offsets(8, 3.5)),
            dummy_model("C", 42.0, &evenly_spaced_offsets(12, 3.5)),
        ])
    }

    #[test]
    fn test_equal_delta_prefers_more_contacts() {
        assert_eq!(suggest_model_id(41.0, &abc_catalog(), 5.0).as_deref(), Some("C"));
    }

    #[test]
    fn test_smallest_delta_wins() {
        assert_eq!(suggest_model_id(40.2, &abc_catalog(), 5.0).as_deref(), Some("A"));
        assert_eq!(suggest_model_id(43.0, &abc_catalog(), 5.0).as_deref(), Some("C"));
    }

    #[test]
    fn test_no_match_outside_tolerance() {
        assert_eq!(suggest_model_id(60.0, &abc_catalog(), 5.0), None);
        // exactly on the tolerance edge still matches
        assert_eq!(suggest_model_id(47.0, &abc_catalog(), 5.0).as_deref(), Some("C"));
    }

    #[test]
    fn test_shorter_model_then_lexical_id_break_remaining_ties() {
        let offsets = [1.0, 4.5, 8.0];
        let catalog = dummy_catalog(vec![
            dummy_model("Z", 38.0, &offsets),
            dummy_model("Y", 42.0, &offsets),
        ]);
        assert_eq!(suggest_model_id(40.0, &catalog, 5.0).as_deref(), Some("Z"));

        let catalog = dummy_catalog(vec![
            dummy_model("M2", 42.0, &offsets),
            dummy_model("M1", 42.0, &offsets),
        ]);
        assert_eq!(suggest_model_id(41.0, &catalog, 5.0).as_deref(), Some("M1"));
    }

    #[test]
    fn test_near_equal_deltas_are_ties() {
        let catalog = dummy_catalog(vec![
            dummy_model("few", 42.0, &[1.0, 2.0]),
            dummy_model("many", 42.0 + 5e-7, &[1.0, 2.0, 3.0]),
        ]);
        assert_eq!(suggest_model_id(41.0, &catalog, 5.0).as_deref(), Some("many"));
    }

    #[test]
    fn test_candidate_subset() {
        let catalog = abc_catalog();
        assert_eq!(
            suggest_model_id_among(41.0, &catalog, &["A", "B", "missing"], 5.0).as_deref(),
            Some("A")
        );
        assert_eq!(
            suggest_model_id_among(41.0, &catalog, &["B", "missing"], 5.0).as_deref(),
            Some("B")
        );
        assert_eq!(suggest_model_id_among(41.0, &catalog, &[], 5.0), None);
    }

    #[test]
    fn test_suggest_assignments_marks_unmatched_with_empty_id() {
        let trajectories = vec![
            straight_trajectory("RHH", 41.0),
            straight_trajectory("LONG", 90.0),
        ];
        let doc = suggest_assignments(&trajectories, &abc_catalog(), 5.0, TipAt::Target);
        assert_eq!(doc.assignments[0].model_id, "C");
        assert!(!doc.assignments[1].is_assigned());
    }
}
