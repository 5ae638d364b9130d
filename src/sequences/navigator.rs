//! Sequence navigator — pure next-step computation over a step list.
//!
//! No hidden state: everything is a function of the step list, the current
//! key, and the accumulated responses, so the whole surface is covered by
//! table-driven tests.

use crate::sequences::step::{ResponseMap, Step, StepKey};

/// Next step key after `current`, honoring the branch table.
///
/// A response matching a branch entry overrides positional order;
/// otherwise the immediately following step is returned, or `None` when
/// `current` is the last step (or not in the list).
pub fn next_step_key(steps: &[Step], current: StepKey, response: Option<&str>) -> Option<StepKey> {
    let index = steps.iter().position(|step| step.key == current)?;

    if let Some(response) = response {
        let branch = steps[index]
            .kind
            .branches()
            .iter()
            .find(|b| b.value == response);
        if let Some(branch) = branch {
            return Some(branch.target);
        }
    }

    steps.get(index + 1).map(|step| step.key)
}

/// Next *visible* step after `current`: one positional/branch move, then a
/// fold that skips every step whose visibility predicate rejects the
/// accumulated responses. `None` means end of sequence.
///
/// Terminates because each skip strictly advances list position (branch
/// targets are only consulted for the initial move, which consumes the
/// response).
pub fn next_visible_step(
    steps: &[Step],
    current: StepKey,
    response: Option<&str>,
    responses: &ResponseMap,
) -> Option<StepKey> {
    let mut next = next_step_key(steps, current, response)?;
    loop {
        let step = steps.iter().find(|step| step.key == next)?;
        if step.visibility.is_visible(responses) {
            return Some(next);
        }
        next = next_step_key(steps, next, None)?;
    }
}
