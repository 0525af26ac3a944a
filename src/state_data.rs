//! Solver-facing buffers: the state/derivative snapshot and the Jacobian
//! writer passed to every device during an assembly pass.

use nalgebra_sparse::{CooMatrix, CscMatrix};

/// The buffers an object reads/writes during a residual, derivative, or
/// Jacobian pass, plus a sequence ID used to distinguish a fresh snapshot
/// from a stale cached one.
#[derive(Debug)]
pub struct StateData<'a> {
    pub time: f64,
    pub state: &'a [f64],
    pub dstate_dt: &'a [f64],
    pub seq_id: u64,
}

impl<'a> StateData<'a> {
    pub fn new(time: f64, state: &'a [f64], dstate_dt: &'a [f64], seq_id: u64) -> Self {
        StateData {
            time,
            state,
            dstate_dt,
            seq_id,
        }
    }
}

/// Jacobian assembly sink: entries accumulate, summing duplicate (row, col)
/// entries rather than overwriting them.
pub trait MatrixData {
    fn assign(&mut self, row: usize, col: usize, value: f64);
}

/// Triplet accumulator, convertible to a [`CscMatrix`] via a `CooMatrix`
/// intermediate, the same way an admittance matrix is assembled from
/// triplets.
#[derive(Debug, Default, Clone)]
pub struct TripletMatrixData {
    rows: Vec<usize>,
    cols: Vec<usize>,
    vals: Vec<f64>,
}

impl MatrixData for TripletMatrixData {
    fn assign(&mut self, row: usize, col: usize, value: f64) {
        self.rows.push(row);
        self.cols.push(col);
        self.vals.push(value);
    }
}

impl TripletMatrixData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.vals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vals.is_empty()
    }

    /// Builds the square Jacobian of dimension `n`, summing duplicate
    /// entries (the `CooMatrix -> Csc` conversion in `nalgebra-sparse` does
    /// this automatically).
    pub fn to_csc(&self, n: usize) -> CscMatrix<f64> {
        let coo =
            CooMatrix::try_from_triplets(n, n, self.rows.clone(), self.cols.clone(), self.vals.clone())
                .expect("jacobian triplet dimensions must be in range");
        CscMatrix::from(&coo)
    }
}
