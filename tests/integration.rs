//! Integration tests for the slicing workflow.
//!
//! Two tasks share a body; task1 is expanded into slice tasks for two
//! slicing functions and the whole model is trained end to end.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rebanar::mtl::TaskPredictions;
use rebanar::prelude::*;
use tracing_subscriber::EnvFilter;

const SEED: u64 = 123;
const N_TRAIN: usize = 1000;
const N_VALID: usize = 100;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn f() -> SlicingFunction {
    SlicingFunction::new("f", |x| Ok(i64::from(x.get("x1")? > x.get("x2")? + 0.5)))
}

fn g() -> SlicingFunction {
    SlicingFunction::new("g", |x| Ok(i64::from(x.get("x1")? > x.get("x2")? + 0.3)))
}

fn create_data(n: usize, rng: &mut StdRng) -> DataFrame {
    let mut x1 = Vec::with_capacity(n);
    let mut x2 = Vec::with_capacity(n);
    let mut y1 = Vec::with_capacity(n);
    let mut y2 = Vec::with_capacity(n);
    for _ in 0..n {
        let a: f32 = rng.gen_range(-1.0..1.0);
        let b: f32 = rng.gen_range(-1.0..1.0);
        x1.push(a);
        x2.push(b);
        y1.push(if a > b + 0.5 { 1.0 } else { 0.0 });
        y2.push(if a > b + 0.25 { 1.0 } else { 0.0 });
    }
    DataFrame::new(vec![
        ("x1".to_string(), x1),
        ("x2".to_string(), x2),
        ("y1".to_string(), y1),
        ("y2".to_string(), y2),
    ])
    .expect("equal-length columns")
}

fn labels(df: &DataFrame, column: &str) -> Vec<i64> {
    df.column(column)
        .expect("label column exists")
        .iter()
        .map(|&v| v as i64)
        .collect()
}

fn create_dataloader(df: &DataFrame, split: &str) -> MultitaskDataLoader {
    let mut x_dict = BTreeMap::new();
    x_dict.insert(
        "coordinates".to_string(),
        df.to_tensor(&["x1", "x2"]).expect("feature columns exist"),
    );
    let mut y_dict = BTreeMap::new();
    y_dict.insert("task1_labels".to_string(), labels(df, "y1"));
    y_dict.insert("task2_labels".to_string(), labels(df, "y2"));
    let mut task_to_label_dict = BTreeMap::new();
    task_to_label_dict.insert("task1".to_string(), "task1_labels".to_string());
    task_to_label_dict.insert("task2".to_string(), "task2_labels".to_string());

    let dataset = MultitaskDataset::new("TestData", x_dict, y_dict)
        .expect("consistent dataset");
    MultitaskDataLoader::new(task_to_label_dict, dataset, split, 4, split == "train")
        .expect("valid loader")
        .with_seed(SEED)
}

fn create_task(name: &str, body: &str, head: &str, seed: u64) -> Task {
    let pool = ModulePool::new()
        .with(
            body,
            Sequential::new()
                .add(Linear::with_seed(2, 10, Some(seed)))
                .add(ReLU::new()),
        )
        .and_then(|p| p.with(head, Linear::with_seed(10, 2, Some(seed + 1))))
        .expect("distinct module names");
    let flow = TaskFlow::new(vec![
        Operation::new(body, vec![InputRef::field("coordinates")]),
        Operation::new(head, vec![InputRef::op(body, 0)]),
    ])
    .expect("valid flow");
    Task::new(
        name,
        pool,
        flow,
        ce_loss(head),
        softmax(head),
        Scorer::new(&["accuracy"]).expect("known metric"),
    )
}

#[test]
fn test_slicing_end_to_end() {
    init_tracing();
    let mut rng = StdRng::seed_from_u64(SEED);
    let df_train = create_data(N_TRAIN, &mut rng);
    let df_valid = create_data(N_VALID, &mut rng);
    let mut loaders = vec![
        create_dataloader(&df_train, "train"),
        create_dataloader(&df_valid, "valid"),
    ];

    let task1 = create_task("task1", "linear1A", "linear2A", 0);
    let task2 = create_task("task2", "linear1A", "linear2B", 10);

    let applier = SFApplier::new(vec![f(), g()]).expect("distinct names");
    let slice_names = applier.names();
    let s_train = applier.apply(&df_train).expect("fields exist");
    let s_valid = applier.apply(&df_valid).expect("fields exist");
    assert_eq!(s_train.shape(), (N_TRAIN, 2));
    assert_eq!(s_valid.shape(), (N_VALID, 2));

    add_slice_labels(&task1, &mut loaders[0], &s_train, &slice_names)
        .expect("train labels");
    add_slice_labels(&task1, &mut loaders[1], &s_valid, &slice_names)
        .expect("valid labels");

    let label_dict = &loaders[0].task_to_label_dict;
    let keys: Vec<&str> = label_dict.keys().map(String::as_str).collect();
    assert_eq!(
        keys,
        vec![
            "task1",
            "task1_slice:base_ind",
            "task1_slice:base_pred",
            "task1_slice:f_ind",
            "task1_slice:f_pred",
            "task1_slice:g_ind",
            "task1_slice:g_pred",
            "task2",
        ]
    );
    assert_eq!(loaders[0].task_to_label_dict["task2"], "task2_labels");

    let mut tasks = convert_to_slice_tasks(task1, &slice_names)
        .expect("valid base task");
    let mut names: Vec<&str> = tasks.iter().map(|t| t.name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(
        names,
        vec![
            "task1",
            "task1_slice:base_ind",
            "task1_slice:base_pred",
            "task1_slice:f_ind",
            "task1_slice:f_pred",
            "task1_slice:g_ind",
            "task1_slice:g_pred",
        ]
    );
    tasks.push(task2);
    let mut model = MultitaskModel::new(tasks).expect("consistent tasks");

    let config = TrainerConfig::from_json_str(r#"{"n_epochs": 3, "progress_bar": false}"#)
        .expect("valid config");
    Trainer::new(config)
        .expect("valid config")
        .fit(&mut model, &loaders)
        .expect("training runs");

    let scores = model.score(&loaders).expect("scoring runs");
    for key in [
        "task1/TestData/train/accuracy",
        "task1/TestData/valid/accuracy",
        "task1_slice:f_ind/TestData/valid/f1",
        "task1_slice:f_pred/TestData/valid/accuracy",
        "task1_slice:g_ind/TestData/valid/f1",
        "task1_slice:g_pred/TestData/valid/accuracy",
        "task1_slice:base_ind/TestData/valid/f1",
        "task1_slice:base_pred/TestData/valid/accuracy",
        "task2/TestData/valid/accuracy",
    ] {
        let score = scores.get(key).copied().expect("score reported");
        assert!(score > 0.9, "{key} = {score}");
    }
}

#[test]
fn test_add_slice_labels_is_reproducible() {
    let mut rng = StdRng::seed_from_u64(SEED);
    let df = create_data(50, &mut rng);
    let applier = SFApplier::new(vec![f(), g()]).expect("distinct names");
    let s = applier.apply(&df).expect("fields exist");
    let task1 = create_task("task1", "linear1A", "linear2A", 0);

    let mut a = create_dataloader(&df, "valid");
    let mut b = create_dataloader(&df, "valid");
    add_slice_labels(&task1, &mut a, &s, &["f", "g"])
        .expect("labels");
    add_slice_labels(&task1, &mut b, &s, &["f", "g"])
        .expect("labels");
    assert_eq!(a.dataset.y_dict, b.dataset.y_dict);
    assert_eq!(a.task_to_label_dict, b.task_to_label_dict);
}

#[test]
fn test_slice_name_mismatch_raises() {
    let mut rng = StdRng::seed_from_u64(SEED);
    let df = create_data(20, &mut rng);
    let s = SFApplier::new(vec![f(), g()])
        .expect("distinct names")
        .apply(&df)
        .expect("fields exist");
    let task1 = create_task("task1", "linear1A", "linear2A", 0);
    let mut loader = create_dataloader(&df, "train");

    assert!(matches!(
        add_slice_labels(&task1, &mut loader, &s, &["f"]),
        Err(RebanarError::DimensionMismatch { .. })
    ));
    assert!(matches!(
        add_slice_labels(&task1, &mut loader, &s, &["f", "g", "h"]),
        Err(RebanarError::DimensionMismatch { .. })
    ));
    assert!(matches!(
        add_slice_labels(&task1, &mut loader, &s, &["f", "base"]),
        Err(RebanarError::InvalidSliceName { .. })
    ));
    assert_eq!(loader.task_to_label_dict.len(), 2);
}

#[test]
fn test_duplicate_task_names_rejected() {
    let result = MultitaskModel::new(vec![
        create_task("task1", "linear1A", "linear2A", 0),
        create_task("task1", "linear1B", "linear2B", 10),
    ]);
    assert!(matches!(result, Err(RebanarError::DuplicateName { .. })));
}

#[test]
fn test_task_without_labels_is_skipped_when_scoring() {
    let mut rng = StdRng::seed_from_u64(SEED);
    let df = create_data(20, &mut rng);
    let mut loader = create_dataloader(&df, "valid");
    loader.task_to_label_dict.remove("task2");

    let model = MultitaskModel::new(vec![
        create_task("task1", "linear1A", "linear2A", 0),
        create_task("task2", "linear1A", "linear2B", 10),
    ])
    .expect("consistent tasks");
    let scores = model.score(&[loader]).expect("scoring runs");
    assert!(scores.contains_key("task1/TestData/valid/accuracy"));
    assert!(!scores.keys().any(|k| k.starts_with("task2/")));
}

#[test]
fn test_save_load_restores_predictions() {
    let mut rng = StdRng::seed_from_u64(SEED);
    let df = create_data(30, &mut rng);
    let loader = create_dataloader(&df, "valid");

    let build = |seed: u64| {
        MultitaskModel::new(vec![create_task("task1", "linear1A", "linear2A", seed)])
            .expect("single task")
    };
    let trained = build(0);
    let mut restored = build(99);

    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("model.json");
    trained.save(&path).expect("save");
    restored.load(&path).expect("load");

    let before: BTreeMap<String, TaskPredictions> = trained.predict(&loader).expect("predict");
    let after = restored.predict(&loader).expect("predict");
    assert_eq!(before["task1"].probs, after["task1"].probs);
    assert_eq!(before["task1"].preds, after["task1"].preds);
}
