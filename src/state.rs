// src/state.rs
//
// Double-buffered per-node state: magnetisation and effective field at steps
// n-1 and n. A step computes a fresh m array; `commit` only installs it once
// every node has finished.

use crate::error::{LlgError, Result};
use crate::llg::check_node;
use crate::vec3::normalize;

/// The four vectors one node needs to produce step n+1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeState {
    pub m_prev: [f64; 3],
    pub m: [f64; 3],
    pub h_prev: [f64; 3],
    pub h: [f64; 3],
}

/// State for all N nodes (structure of arrays, same indexing everywhere).
#[derive(Debug, Clone, PartialEq)]
pub struct MeshState {
    pub m_prev: Vec<[f64; 3]>,
    pub m: Vec<[f64; 3]>,
    pub h_prev: Vec<[f64; 3]>,
    pub h: Vec<[f64; 3]>,
}

impl MeshState {
    /// Start from a given magnetisation; history equals the current state and
    /// fields are zero until `prime_fields` is called.
    pub fn from_magnetization(m: Vec<[f64; 3]>) -> Self {
        let n = m.len();
        Self {
            m_prev: m.clone(),
            m,
            h_prev: vec![[0.0; 3]; n],
            h: vec![[0.0; 3]; n],
        }
    }

    /// N nodes all pointing along `dir` (normalised).
    pub fn new_uniform(n: usize, dir: [f64; 3]) -> Self {
        Self::from_magnetization(vec![normalize(dir); n])
    }

    /// N nodes tilted by `theta_deg` from +z in the x–z plane.
    pub fn new_tilted(n: usize, theta_deg: f64) -> Self {
        let theta = theta_deg.to_radians();
        Self::new_uniform(n, [theta.sin(), 0.0, theta.cos()])
    }

    pub fn len(&self) -> usize {
        self.m.len()
    }

    pub fn is_empty(&self) -> bool {
        self.m.is_empty()
    }

    #[inline]
    pub fn node(&self, i: usize) -> NodeState {
        NodeState {
            m_prev: self.m_prev[i],
            m: self.m[i],
            h_prev: self.h_prev[i],
            h: self.h[i],
        }
    }

    /// Install the field for the initial state: with no history, H_prev = H.
    pub fn prime_fields(&mut self, h: Vec<[f64; 3]>) -> Result<()> {
        check_len("h", h.len(), self.len())?;
        self.h_prev = h.clone();
        self.h = h;
        Ok(())
    }

    /// Install H and H_prev for a state restarted with its own history.
    pub fn set_fields(&mut self, h: Vec<[f64; 3]>, h_prev: Vec<[f64; 3]>) -> Result<()> {
        check_len("h", h.len(), self.len())?;
        check_len("h_prev", h_prev.len(), self.len())?;
        self.h = h;
        self.h_prev = h_prev;
        Ok(())
    }

    /// Shift current -> previous and install the new step.
    pub fn commit(&mut self, m_next: Vec<[f64; 3]>, h_next: Vec<[f64; 3]>) -> Result<()> {
        check_len("m_next", m_next.len(), self.len())?;
        check_len("h_next", h_next.len(), self.len())?;
        self.m_prev = std::mem::replace(&mut self.m, m_next);
        self.h_prev = std::mem::replace(&mut self.h, h_next);
        Ok(())
    }

    /// Equal array lengths and finite, nonzero inputs at every node.
    pub fn validate(&self) -> Result<()> {
        let n = self.len();
        check_len("m_prev", self.m_prev.len(), n)?;
        check_len("h", self.h.len(), n)?;
        check_len("h_prev", self.h_prev.len(), n)?;
        for i in 0..n {
            check_node(&self.node(i)).map_err(|e| match e {
                LlgError::InvalidArgument { param, reason } => LlgError::InvalidArgument {
                    param,
                    reason: format!("node {i}: {reason}"),
                },
                other => other,
            })?;
        }
        Ok(())
    }
}

fn check_len(param: &'static str, got: usize, expected: usize) -> Result<()> {
    if got != expected {
        return Err(LlgError::invalid(
            param,
            format!("length mismatch: got {got}, expected {expected}"),
        ));
    }
    Ok(())
}
