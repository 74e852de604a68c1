//! Quantization jobs: the per-beat search over q-grids

use tracing::debug;

use crate::error::Result;
use crate::grid::QGrid;
use crate::proxy::QEventProxy;
use crate::search_tree::SearchTree;

/// One beat's search state.
///
/// Every grid the search visits is kept as a candidate, the undivided
/// starting grid included, so refinement never loses the parent's fit.
#[derive(Debug, Clone)]
pub struct QuantizationJob {
    job_id: usize,
    search_tree: SearchTree,
    q_event_proxies: Vec<QEventProxy>,
    q_grids: Option<Vec<QGrid>>,
}

impl QuantizationJob {
    pub fn new(job_id: usize, search_tree: SearchTree, q_event_proxies: &[QEventProxy]) -> Self {
        Self {
            job_id,
            search_tree,
            q_event_proxies: q_event_proxies.to_vec(),
            q_grids: None,
        }
    }

    pub fn job_id(&self) -> usize {
        self.job_id
    }

    pub fn search_tree(&self) -> &SearchTree {
        &self.search_tree
    }

    pub fn q_event_proxies(&self) -> &[QEventProxy] {
        &self.q_event_proxies
    }

    /// Candidate grids, empty until the job has run
    pub fn q_grids(&self) -> &[QGrid] {
        self.q_grids.as_deref().unwrap_or(&[])
    }

    pub fn is_complete(&self) -> bool {
        self.q_grids.is_some()
    }

    /// Hand the candidates over, leaving the job un-run
    pub fn take_q_grids(&mut self) -> Vec<QGrid> {
        self.q_grids.take().unwrap_or_default()
    }

    /// Run the search to exhaustion. Later calls return the cached result.
    pub fn run(&mut self) -> Result<&[QGrid]> {
        if self.q_grids.is_none() {
            self.q_grids = Some(self.search()?);
        }
        Ok(self.q_grids())
    }

    fn search(&self) -> Result<Vec<QGrid>> {
        let mut grid = QGrid::new();
        grid.fit_q_events(self.q_event_proxies.iter().cloned());

        // depth-first: newest candidates are expanded first
        let mut pending = vec![grid];
        let mut visited = Vec::new();
        while let Some(grid) = pending.pop() {
            pending.extend(self.search_tree.search(&grid)?);
            visited.push(grid);
        }
        for grid in &mut visited {
            grid.sort_q_events_by_index();
        }
        debug!(
            job_id = self.job_id,
            proxies = self.q_event_proxies.len(),
            candidates = visited.len(),
            "Quantization job searched"
        );
        Ok(visited)
    }
}
