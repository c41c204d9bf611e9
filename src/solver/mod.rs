use rand::Rng;

pub mod td;

// Estimated action values Q(S, A) that solvers can read and update.
pub trait ActionValues<S, A> {
    fn value(&self, state: &S, action: &A) -> f64;
    fn set_value(&mut self, state: &S, action: &A, value: f64);
}

// Sparse table fixture for the solver tests: unseen state-action pairs are valued at 0.
#[cfg(test)]
mod sparse {
    use std::collections::HashMap;
    use std::hash::Hash;

    use super::ActionValues;

    impl<S, A> ActionValues<S, A> for HashMap<S, HashMap<A, f64>>
    where
        S: Eq + Hash + Clone,
        A: Eq + Hash + Clone,
    {
        fn value(&self, state: &S, action: &A) -> f64 {
            *self
                .get(state)
                .map_or(&0.0, |av| av.get(action).unwrap_or(&0.0))
        }

        fn set_value(&mut self, state: &S, action: &A, value: f64) {
            self.entry(state.clone())
                .or_default()
                .insert(action.clone(), value);
        }
    }
}

// Returns the action with the maximum value in `state`.
// Ties go to the action listed first in `actions`.
pub fn greedy_action<S, A, Q>(action_values: &Q, state: &S, actions: &[A]) -> A
where
    A: Copy,
    Q: ActionValues<S, A>,
{
    assert!(!actions.is_empty());

    let mut best_action = actions[0];
    let mut best_value = f64::NEG_INFINITY;
    for action in actions {
        let value = action_values.value(state, action);
        if value > best_value {
            best_action = *action;
            best_value = value;
        }
    }
    best_action
}

// ε-greedy choice: with probability `exploration_fraction` any of `actions` uniformly at random,
// otherwise the greedy one.
pub fn soft_greedy_action<S, A, Q, R>(
    action_values: &Q,
    state: &S,
    actions: &[A],
    exploration_fraction: f64,
    rng: &mut R,
) -> A
where
    A: Copy,
    Q: ActionValues<S, A>,
    R: Rng + ?Sized,
{
    if rng.gen::<f64>() < exploration_fraction {
        return actions[rng.gen_range(0..actions.len())];
    }
    greedy_action(action_values, state, actions)
}

/// Rounds `value` to the given number of decimal places.
pub fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}
