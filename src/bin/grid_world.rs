use bellman::mdp::{GridWorld, Mdp};
use bellman::solvers::{estimate, policy_iteration, value_iteration, MonteCarloConfig};

fn main() -> bellman::Result<()> {
    let world = GridWorld::textbook();
    let epsilon = 0.001;

    let (utility, policy, iterations) = value_iteration(&world, epsilon)?;
    println!("Value iteration converged in {} iterations", iterations);
    println!("{}", world.render_utilities(&utility));
    println!("{}", world.render_policy(&policy));

    let pi_policy = policy_iteration(&world, 20)?;
    println!(
        "Policy iteration agrees with value iteration: {}",
        pi_policy == policy
    );

    let start = world.initial_state();
    let config = MonteCarloConfig {
        seed: Some(0),
        parallel: true,
        ..MonteCarloConfig::default()
    };
    let est = estimate(&world, &policy, start, &config)?;
    println!(
        "Monte Carlo utility of start state: {:.4} +/- {:.4} (value iteration: {:.4})",
        est.mean,
        est.standard_error(),
        utility.get(&start).unwrap_or(f64::NAN)
    );
    Ok(())
}
