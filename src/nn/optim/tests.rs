use super::*;
use crate::autograd::clear_graph;

#[test]
fn test_sgd_basic() {
    clear_graph();

    let mut param = Tensor::from_slice(&[1.0, 2.0, 3.0]).requires_grad();
    let param_id = param.id();

    // loss = sum(x²)
    param.mul(&param).sum().backward();

    let grad = get_grad(param_id).expect("Should have gradient");
    assert_eq!(grad.data(), &[2.0, 4.0, 6.0]);

    let mut sgd = SGD::new(vec![&mut param], 0.1);
    sgd.step_with_params(&mut [&mut param], 1.0);

    // param = [1, 2, 3] - 0.1 * [2, 4, 6]
    let expected = [0.8, 1.6, 2.4];
    for (p, e) in param.data().iter().zip(expected.iter()) {
        assert!((p - e).abs() < 1e-5, "Expected {e}, got {p}");
    }
    clear_graph();
}

#[test]
fn test_sgd_with_momentum() {
    clear_graph();

    let mut param = Tensor::from_slice(&[1.0]).requires_grad();
    param.mul(&param).sum().backward();

    let mut sgd = SGD::new(vec![&mut param], 0.1).momentum(0.9);
    sgd.step_with_params(&mut [&mut param], 1.0);

    // v = 2.0, param = 1.0 - 0.2
    assert!((param.data()[0] - 0.8).abs() < 1e-5);

    clear_graph();
    param.mul(&param).sum().backward();
    sgd.step_with_params(&mut [&mut param], 1.0);

    // grad = 1.6, v = 0.9 * 2.0 + 1.6 = 3.4, param = 0.8 - 0.34
    assert!((param.data()[0] - 0.46).abs() < 1e-5);
    clear_graph();
}

#[test]
fn test_grad_scale_shrinks_update() {
    clear_graph();

    let mut param = Tensor::from_slice(&[1.0]).requires_grad();
    param.mul(&param).sum().backward();

    let mut sgd = SGD::new(vec![&mut param], 0.1);
    sgd.step_with_params(&mut [&mut param], 0.5);

    // g = 0.5 * 2.0
    assert!((param.data()[0] - 0.9).abs() < 1e-5);
    clear_graph();
}

#[test]
fn test_sgd_weight_decay() {
    clear_graph();

    let mut param = Tensor::from_slice(&[2.0]).requires_grad();
    param.mul_scalar(0.0).sum().backward();

    let mut sgd = SGD::new(vec![&mut param], 0.1).weight_decay(0.5);
    sgd.step_with_params(&mut [&mut param], 1.0);

    // g = 0 + 0.5 * 2.0
    assert!((param.data()[0] - 1.9).abs() < 1e-5);
    clear_graph();
}

#[test]
fn test_adam_first_step_moves_by_lr() {
    clear_graph();

    let mut param = Tensor::from_slice(&[1.0, -1.0]).requires_grad();
    param.mul(&param).sum().backward();

    let mut adam = Adam::new(vec![&mut param], 0.01);
    adam.step_with_params(&mut [&mut param], 1.0);

    // Bias-corrected first step is lr * sign(grad)
    assert!((param.data()[0] - 0.99).abs() < 1e-4);
    assert!((param.data()[1] + 0.99).abs() < 1e-4);
    clear_graph();
}

#[test]
fn test_adam_converges_on_quadratic() {
    let mut param = Tensor::from_slice(&[3.0]).requires_grad();
    let mut adam = Adam::new(vec![&mut param], 0.05);

    for _ in 0..400 {
        clear_graph();
        param.mul(&param).sum().backward();
        adam.step_with_params(&mut [&mut param], 1.0);
    }
    clear_graph();

    assert!(param.data()[0].abs() < 0.25);
}

#[test]
fn test_adam_betas_shape_second_step() {
    let run = |beta1: f32, beta2: f32| {
        let mut param = Tensor::from_slice(&[1.0]).requires_grad();
        let mut adam = Adam::new(vec![&mut param], 0.1).betas(beta1, beta2);
        for _ in 0..2 {
            clear_graph();
            param.mul(&param).sum().backward();
            adam.step_with_params(&mut [&mut param], 1.0);
        }
        clear_graph();
        param.data()[0]
    };
    // First step is lr * sign(grad) for any betas, the second is not
    assert!((run(0.9, 0.0) - run(0.0, 0.0)).abs() > 1e-3);
}

#[test]
fn test_param_without_grad_untouched() {
    clear_graph();

    let mut used = Tensor::from_slice(&[1.0]).requires_grad();
    let mut unused = Tensor::from_slice(&[5.0]).requires_grad();
    used.mul(&used).sum().backward();

    let mut adam = Adam::new(vec![&mut used, &mut unused], 0.1);
    adam.step_with_params(&mut [&mut used, &mut unused], 1.0);

    assert_eq!(unused.data(), &[5.0]);
    assert!(used.data()[0] < 1.0);
    clear_graph();
}

#[test]
fn test_zero_grad_clears_tape_gradients() {
    clear_graph();

    let mut param = Tensor::from_slice(&[1.0]).requires_grad();
    param.mul(&param).sum().backward();
    assert!(get_grad(param.id()).is_some());

    let mut sgd = SGD::new(vec![&mut param], 0.1);
    sgd.zero_grad();
    assert!(get_grad(param.id()).is_none());
    clear_graph();
}

#[test]
fn test_set_lr() {
    let mut param = Tensor::from_slice(&[1.0]).requires_grad();
    let mut adam = Adam::new(vec![&mut param], 0.1);
    adam.set_lr(0.05);
    assert!((adam.lr() - 0.05).abs() < 1e-9);
}
