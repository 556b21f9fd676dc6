pub(crate) use super::*;

#[test]
fn test_from_vec() {
    let m = Matrix::from_vec(2, 3, vec![1.0_f32, 2.0, 3.0, 4.0, 5.0, 6.0])
        .expect("test data has correct dimensions: 2*3=6 elements");
    assert_eq!(m.shape(), (2, 3));
    assert!((m.get(0, 0) - 1.0).abs() < 1e-6);
    assert!((m.get(1, 2) - 6.0).abs() < 1e-6);
}

#[test]
fn test_from_vec_error() {
    let result = Matrix::from_vec(2, 3, vec![1_i64, 2, 3]);
    assert!(result.is_err());
}

#[test]
fn test_zero_columns() {
    let m = Matrix::<i64>::from_vec(4, 0, Vec::new()).expect("no columns is valid");
    assert_eq!(m.shape(), (4, 0));
    assert!(m.row(3).is_empty());
}

#[test]
fn test_set_and_column() {
    let mut m = Matrix::from_vec(2, 2, vec![0_i64; 4])
        .expect("2*2=4 elements");
    m.set(1, 0, 7);
    assert_eq!(m.column(0), vec![0, 7]);
    assert_eq!(m.column(1), vec![0, 0]);
}

#[test]
fn test_serde_roundtrip() {
    let m = Matrix::from_vec(1, 2, vec![1_i64, 0])
        .expect("1*2=2 elements");
    let json = serde_json::to_string(&m).expect("serializable");
    let back: Matrix<i64> = serde_json::from_str(&json).expect("deserializable");
    assert_eq!(m, back);
}
