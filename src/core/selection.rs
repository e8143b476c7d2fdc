//! Selection gate for the fusion pre-step
//!
//! Once a fan-out batch settles, the successful responses become fusion
//! candidates. The gate holds the one source of truth for which candidates
//! are chosen and refuses to confirm unless the live count is 2 or 3. The
//! count is read at confirm time, never cached from an earlier render.

use std::collections::BTreeSet;
use std::ops::RangeInclusive;

/// The candidate subset headed into fusion. Exists only while the gate is
/// open and is consumed by the fusion orchestrator on confirm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FusionSelection {
    /// `(model_id, text)` pairs drawn from a completed batch, in offer order.
    pub candidates: Vec<(String, String)>,
    pub chosen: BTreeSet<usize>,
}

impl FusionSelection {
    /// Selected `(model_id, text)` pairs in candidate order.
    pub fn selected_pairs(&self) -> Vec<(String, String)> {
        self.chosen
            .iter()
            .filter_map(|&i| self.candidates.get(i).cloned())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmError {
    GateClosed,
    /// The live chosen count is outside the allowed range. Carries the
    /// count observed at confirm time.
    CountOutOfRange(usize),
}

#[derive(Debug, Default)]
pub enum SelectionGate {
    #[default]
    Closed,
    Open(FusionSelection),
}

impl SelectionGate {
    /// Fusion needs at least 2 and at most 3 participating responses.
    pub const CONFIRM_RANGE: RangeInclusive<usize> = 2..=3;

    /// Offer a candidate set. The gate opens only when at least two
    /// candidates are available; with fewer, fusion is not offered at all
    /// and the fan-out result stands alone. All candidates start selected.
    pub fn offer(&mut self, candidates: Vec<(String, String)>) -> bool {
        if candidates.len() < *Self::CONFIRM_RANGE.start() {
            *self = SelectionGate::Closed;
            return false;
        }
        let chosen = (0..candidates.len()).collect();
        *self = SelectionGate::Open(FusionSelection { candidates, chosen });
        true
    }

    pub fn is_open(&self) -> bool {
        matches!(self, SelectionGate::Open(_))
    }

    pub fn selection(&self) -> Option<&FusionSelection> {
        match self {
            SelectionGate::Open(selection) => Some(selection),
            SelectionGate::Closed => None,
        }
    }

    /// Flip one candidate's membership. Out-of-range indices and toggles on
    /// a closed gate are ignored.
    pub fn toggle(&mut self, index: usize) {
        if let SelectionGate::Open(selection) = self {
            if index >= selection.candidates.len() {
                return;
            }
            if !selection.chosen.remove(&index) {
                selection.chosen.insert(index);
            }
        }
    }

    /// Whether confirm would currently succeed. `enabled(s) == (s==2 || s==3)`.
    pub fn confirm_enabled(&self) -> bool {
        match self {
            SelectionGate::Open(selection) => Self::CONFIRM_RANGE.contains(&selection.chosen.len()),
            SelectionGate::Closed => false,
        }
    }

    /// Consume the gate. This is a hard precondition: a count outside 2..=3
    /// rejects the action and leaves the gate open, so the fusion
    /// orchestrator can never be invoked with an invalid subset.
    pub fn confirm(&mut self) -> Result<FusionSelection, ConfirmError> {
        match self {
            SelectionGate::Closed => Err(ConfirmError::GateClosed),
            SelectionGate::Open(selection) => {
                let live_count = selection.chosen.len();
                if !Self::CONFIRM_RANGE.contains(&live_count) {
                    return Err(ConfirmError::CountOutOfRange(live_count));
                }
                let selection = selection.clone();
                *self = SelectionGate::Closed;
                Ok(selection)
            }
        }
    }

    pub fn cancel(&mut self) {
        *self = SelectionGate::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates(n: usize) -> Vec<(String, String)> {
        (0..n)
            .map(|i| (format!("model-{i}"), format!("answer {i}")))
            .collect()
    }

    #[test]
    fn gate_stays_closed_below_two_candidates() {
        let mut gate = SelectionGate::default();
        assert!(!gate.offer(candidates(0)));
        assert!(!gate.is_open());
        assert!(!gate.offer(candidates(1)));
        assert!(!gate.is_open());
        assert_eq!(gate.confirm(), Err(ConfirmError::GateClosed));
    }

    #[test]
    fn gate_opens_with_all_candidates_preselected() {
        let mut gate = SelectionGate::default();
        assert!(gate.offer(candidates(3)));
        let selection = gate.selection().unwrap();
        assert_eq!(selection.chosen.len(), 3);
        assert!(gate.confirm_enabled());
    }

    #[test]
    fn confirm_enabled_iff_count_is_two_or_three() {
        // Four candidates so every count 0..=4 is reachable.
        let mut gate = SelectionGate::default();
        gate.offer(candidates(4));

        for target in (0..=4).rev() {
            let count = gate.selection().unwrap().chosen.len();
            assert_eq!(count, target);
            assert_eq!(gate.confirm_enabled(), target == 2 || target == 3);
            if target > 0 {
                gate.toggle(target - 1);
            }
        }
    }

    #[test]
    fn confirm_rejects_out_of_range_counts_without_closing() {
        let mut gate = SelectionGate::default();
        gate.offer(candidates(4));
        // All four selected: over the limit.
        assert_eq!(gate.confirm(), Err(ConfirmError::CountOutOfRange(4)));
        assert!(gate.is_open());

        gate.toggle(3);
        gate.toggle(2);
        gate.toggle(1);
        // One selected: under the limit.
        assert_eq!(gate.confirm(), Err(ConfirmError::CountOutOfRange(1)));
        assert!(gate.is_open());

        gate.toggle(1);
        let selection = gate.confirm().expect("two selected should confirm");
        assert_eq!(selection.chosen.len(), 2);
        assert!(!gate.is_open());
    }

    #[test]
    fn toggle_reads_live_state_at_confirm_time() {
        let mut gate = SelectionGate::default();
        gate.offer(candidates(3));
        assert!(gate.confirm_enabled());

        // Deselect down to one after the enabled check: confirm must see
        // the current count, not the earlier one.
        gate.toggle(0);
        gate.toggle(1);
        assert_eq!(gate.confirm(), Err(ConfirmError::CountOutOfRange(1)));
    }

    #[test]
    fn toggle_ignores_out_of_range_indices() {
        let mut gate = SelectionGate::default();
        gate.offer(candidates(2));
        gate.toggle(5);
        assert_eq!(gate.selection().unwrap().chosen.len(), 2);
    }

    #[test]
    fn selected_pairs_preserve_candidate_order() {
        let mut gate = SelectionGate::default();
        gate.offer(vec![
            ("ModelX".to_string(), "foo".to_string()),
            ("ModelY".to_string(), "bar".to_string()),
            ("ModelZ".to_string(), "baz".to_string()),
        ]);
        gate.toggle(1);

        let selection = gate.confirm().unwrap();
        assert_eq!(
            selection.selected_pairs(),
            vec![
                ("ModelX".to_string(), "foo".to_string()),
                ("ModelZ".to_string(), "baz".to_string()),
            ]
        );
    }

    #[test]
    fn two_candidate_offer_requires_both_for_confirm() {
        // The concrete scenario from the fan-out: three models answered
        // "A", "" and "C"; the empty response is excluded upstream, so the
        // gate is offered exactly two candidates.
        let mut gate = SelectionGate::default();
        assert!(gate.offer(vec![
            ("model-a".to_string(), "A".to_string()),
            ("model-c".to_string(), "C".to_string()),
        ]));

        gate.toggle(0);
        assert!(!gate.confirm_enabled());
        assert_eq!(gate.confirm(), Err(ConfirmError::CountOutOfRange(1)));

        gate.toggle(0);
        let selection = gate.confirm().unwrap();
        assert_eq!(selection.selected_pairs().len(), 2);
    }

    #[test]
    fn cancel_closes_without_consuming() {
        let mut gate = SelectionGate::default();
        gate.offer(candidates(2));
        gate.cancel();
        assert!(!gate.is_open());
        assert_eq!(gate.confirm(), Err(ConfirmError::GateClosed));
    }
}
