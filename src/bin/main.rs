use convnet_loss::config::LaunchSettings;
use convnet_loss::loss::{compute_psvm_load_grad, predict_labels};
use convnet_loss::{
    compute_eltwise_max_grad, AdaptiveSvmLoss, CaseStats, CompositeActivation, L2SvmLoss, LogregLoss,
    Loss, MarginParams, Matrix, RobustLogregLoss,
};
use rand::Rng;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    if LaunchSettings::from_env().install().is_err() {
        log::warn!("launch settings were already fixed");
    }

    // Define problem parameters
    let num_out = 10;
    let num_cases = 256;
    let mut rng = rand::rng();

    // Random logits, labels and per-case L2 loads
    let logits = Matrix::from_vec(num_out, num_cases,
                                  (0..num_out * num_cases).map(|_| rng.random_range(-3.0f32..3.0)).collect());
    let labels = Matrix::from_vec(1, num_cases,
                                  (0..num_cases).map(|_| rng.random_range(0..num_out) as f32).collect());
    let l2 = Matrix::from_vec(1, num_cases, (0..num_cases).map(|_| rng.random_range(0.0f32..4.0)).collect());
    let probs = softmax(&logits);

    let mut predicted = Matrix::empty();
    predict_labels(&probs, &mut predicted);
    println!("First predictions: {:?}", &predicted.to_vec()[..8]);

    let margin = AdaptiveSvmLoss { params: MarginParams::new(1.0, 2.0, 0.05, 0.5), l2: &l2 };
    let runs: Vec<(&str, Box<dyn Loss + '_>, &Matrix)> = vec![
        ("logreg", Box::new(LogregLoss::probs()), &probs),
        ("logreg+softmax", Box::new(LogregLoss::softmax()), &probs),
        ("robust logreg+softmax", Box::new(RobustLogregLoss::new(1.0, true)), &probs),
        ("l2-svm", Box::new(L2SvmLoss), &logits),
        ("adaptive svm", Box::new(margin), &logits),
    ];

    println!("\n{:<24} {:>10} {:>9} {:>10}", "loss", "cost", "accuracy", "|grad|");
    let mut stats = CaseStats::new();
    let mut grad = Matrix::empty();
    for (name, loss, input) in &runs {
        loss.forward(&labels, input, &mut stats);
        loss.backward(&labels, input, &stats, &mut grad, 1.0 / num_cases as f32, false);
        let norm = grad.to_vec().iter().filter(|g| g.is_finite()).map(|g| g * g).sum::<f32>().sqrt();
        println!("{:<24} {:>10.4} {:>9.3} {:>10.4}", name, stats.total_cost(), stats.accuracy(), norm);
    }

    let mut load_grad = Matrix::empty();
    compute_psvm_load_grad(&labels, &logits, &l2, &margin.params, &mut load_grad, false, 1.0);
    println!("\nAdaptive svm load gradient sum: {:.4}", load_grad.sum());

    // Composite activation over three random channels
    let channel = |rng: &mut rand::rngs::ThreadRng| {
        Matrix::from_vec(num_out, num_cases,
                         (0..num_out * num_cases).map(|_| rng.random_range(-1.0f32..1.0)).collect())
    };
    let (in0, in1, in2) = (channel(&mut rng), channel(&mut rng), channel(&mut rng));
    let layer = CompositeActivation::new([0.1, -0.2, 0.3, 0.05, 0.4]);
    let mut out = Matrix::empty();
    layer.forward(&in0, &in1, &in2, &mut out);

    let param_grads = layer.param_grads(&out, &in0, &in1, &in2).reduce();
    println!("Composite parameter gradients: {:?}", param_grads);

    // Route the output gradient through an elementwise max of the first channel
    let mut max_grad = Matrix::empty();
    compute_eltwise_max_grad(&out, &in0, &out, &mut max_grad, false);
    let routed = max_grad.to_vec().iter().filter(|g| **g != 0.0).count();
    println!("Max gradient routed to {} of {} cells", routed, max_grad.len());

    Ok(())
}

// Column-wise softmax of a num_out x num_cases matrix
fn softmax(logits: &Matrix) -> Matrix {
    let mut probs = Matrix::zeros(logits.rows(), logits.cols());
    for case in 0..logits.cols() {
        let max = (0..logits.rows()).map(|r| logits.get(r, case)).fold(f32::NEG_INFINITY, f32::max);
        let total: f32 = (0..logits.rows()).map(|r| (logits.get(r, case) - max).exp()).sum();
        for r in 0..logits.rows() {
            probs.set(r, case, (logits.get(r, case) - max).exp() / total);
        }
    }
    probs
}
