use proptest::prelude::*;

/// Per-item attempt scripts: each item fails a number of times before it
/// succeeds, or never succeeds (`None`)
pub fn failure_plan_strategy() -> impl Strategy<Value = Vec<Option<u32>>> {
    prop::collection::vec(prop::option::weighted(0.7, 0u32..5), 0..8)
}

/// Attempt limit and pool width
pub fn policy_strategy() -> impl Strategy<Value = (u32, usize)> {
    (1u32..=4, 1usize..=4)
}

/// Expand a failure plan entry into the answers the transport will give
pub fn answers_for(failures_before_success: Option<u32>, attempts: u32) -> Vec<bool> {
    match failures_before_success {
        Some(failures) => {
            let mut answers = vec![false; failures as usize];
            answers.push(true);
            answers
        }
        None => vec![false; attempts as usize],
    }
}
