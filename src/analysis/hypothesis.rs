// src/analysis/hypothesis.rs
//
// Multi-hypothesis selection: plain arg-max, first index wins ties.

use crate::outputs::{LeadHorizon, ModelOutput};

/// Index of the largest value; ties resolve to the lowest index.
///
/// A NaN after the first entry never wins since `>` is false for it. An
/// empty input returns 0, which is also the answer for a single hypothesis.
pub fn argmax<I>(values: I) -> usize
where
    I: IntoIterator<Item = f32>,
{
    let mut best_idx = 0;
    let mut best = f32::NEG_INFINITY;
    for (i, v) in values.into_iter().enumerate() {
        if i == 0 || v > best {
            best_idx = i;
            best = v;
        }
    }
    best_idx
}

/// Most probable plan hypothesis (largest trailing logit)
pub fn select_plan(output: &ModelOutput<'_>) -> usize {
    argmax(output.plan_logits())
}

/// Most probable lead mixture component at one horizon
pub fn select_lead(output: &ModelOutput<'_>, horizon: LeadHorizon) -> usize {
    argmax(output.lead_weights(horizon))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{LayoutParams, OutputLayout, SegmentKind};

    #[test]
    fn test_argmax_tie_goes_to_lowest_index() {
        assert_eq!(argmax(vec![0.1, 0.9, 0.3, 0.9]), 1);
        assert_eq!(argmax(vec![2.0, 2.0]), 0);
    }

    #[test]
    fn test_argmax_single_and_empty() {
        assert_eq!(argmax(vec![-5.0]), 0);
        assert_eq!(argmax(Vec::<f32>::new()), 0);
    }

    #[test]
    fn test_argmax_all_negative() {
        assert_eq!(argmax(vec![-3.0, -1.0, -2.0]), 1);
    }

    #[test]
    fn test_argmax_later_nan_ignored() {
        assert_eq!(argmax(vec![1.0, f32::NAN, 0.5]), 0);
    }

    #[test]
    fn test_select_plan_single_hypothesis() {
        let layout = OutputLayout::new(LayoutParams {
            plan_hypotheses: 1,
            ..LayoutParams::default()
        });
        let data = vec![0.0; layout.total_len()];
        let out = ModelOutput::new(&layout, &data).unwrap();
        assert_eq!(select_plan(&out), 0);
    }

    #[test]
    fn test_select_lead_horizons_independent() {
        let layout = OutputLayout::default();
        let mut data = vec![0.0; layout.total_len()];
        let lead = layout.range(SegmentKind::Lead).unwrap();
        let group = layout.params().lead_group_size();
        data[lead.start + 3 * group + 8] = 2.0; // component 3 wins now
        data[lead.start + group + 9] = 1.0; // component 1 wins +2s
        let out = ModelOutput::new(&layout, &data).unwrap();
        assert_eq!(select_lead(&out, LeadHorizon::Now), 3);
        assert_eq!(select_lead(&out, LeadHorizon::In2s), 1);
    }
}
