use crate::solver::*;

// Backward credit assignment over a finished episode.
//
// Walks the episode from the last state-action pair to the first:
//   Q(S, A) ← Q(S, A) + α∙[G - Q(S, A)],
// where G is the final reward for the last pair and, for every earlier pair, the freshly
// updated (unrounded) estimate of the pair that followed it. Stored values are rounded to
// `places` decimals. Returns the estimate computed for the first pair of the episode.
pub fn backward_sweep<S, A, Q>(
    action_values: &mut Q,
    episode: &[(S, A)],
    reward: f64,
    alpha: f64,
    places: i32,
) -> f64
where
    Q: ActionValues<S, A>,
{
    episode
        .iter()
        .rev()
        .fold(reward, |target, (state, action)| {
            let old_value = action_values.value(state, action);
            let estimate = old_value + alpha * (target - old_value);
            action_values.set_value(state, action, round_to(estimate, places));
            estimate
        })
}

// Exploration rate for `episode` out of `episodes`:
//   ε = ε₀^(1 + decay∙episode/episodes)
pub fn decayed_exploration(initial: f64, decay: f64, episode: u64, episodes: u64) -> f64 {
    if episodes == 0 {
        return initial;
    }
    initial.powf(1.0 + decay * episode as f64 / episodes as f64)
}
