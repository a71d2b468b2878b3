// Display-only figure for the form. It is not learned from data and is not
// part of the trained model.
pub fn approx_win_probability(current_score: u32, over: u32, ball: u32, wickets: u32) -> f64 {
    let balls_faced = f64::from(over * 6 + ball + 1);
    let run_rate_term = f64::from(current_score) / balls_faced * 1.5;
    let wickets_term = (10.0 - f64::from(wickets)) * 5.0;
    round2(run_rate_term + wickets_term).min(100.0)
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::approx_win_probability;
    use approx::assert_relative_eq;

    #[test]
    fn default_form_values() {
        // 50 runs after 5.3 overs with 3 down.
        let p = approx_win_probability(50, 5, 3, 3);
        assert_relative_eq!(p, 37.21);
    }

    #[test]
    fn first_ball_no_wickets() {
        assert_relative_eq!(approx_win_probability(0, 0, 1, 0), 50.0);
    }

    #[test]
    fn capped_at_one_hundred() {
        assert_relative_eq!(approx_win_probability(200, 0, 1, 0), 100.0);
    }

    #[test]
    fn all_out_leaves_only_run_rate() {
        assert_relative_eq!(approx_win_probability(120, 19, 5, 10), 1.5);
    }
}
