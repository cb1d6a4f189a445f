use ep_rust::{Bernoulli, EngineOptions, ExpectationPropagation, Model};
use log::{error, info};

fn run_instance(name: &str, prior: f64, uses: &[f64]) -> ep_rust::Result<Bernoulli> {
    info!("Processing instance {}.", name);

    let model = Model::bernoulli(prior, uses.len())?;
    let mut engine = ExpectationPropagation::new(model, EngineOptions::default());
    engine.reset()?;
    for (index, prob_true) in uses.iter().enumerate() {
        engine.set_use_probability(index, *prob_true)?;
    }
    let marginal = engine.run()?;

    info!("Finished processing instance {}: marginal {}.", name, marginal);
    Ok(marginal)
}

fn main() {
    env_logger::init();

    let instances: [(&str, f64, &[f64]); 3] = [
        ("prior only", 0.01, &[]),
        ("uniform prior, one use", 0.5, &[0.9]),
        ("contradiction", 1.0, &[0.0]),
    ];
    for (name, prior, uses) in instances {
        match run_instance(name, prior, uses) {
            Ok(marginal) => println!("{}: {}", name, marginal),
            Err(err) => error!("Inference failed for instance {}: {}", name, err),
        }
    }
}
