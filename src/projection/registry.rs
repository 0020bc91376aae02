//! Projection registry
//!
//! Only a handful of windows are projected at any time, so lookups are plain
//! linear scans.

use crate::display::Window;
use crate::projection::{Projection, ProjectionId, Side};

#[derive(Debug, Default)]
pub struct Registry {
    projections: Vec<Projection>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.projections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projections.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Projection> {
        self.projections.iter()
    }

    pub fn ids(&self) -> Vec<ProjectionId> {
        self.projections.iter().map(|p| p.id).collect()
    }

    pub fn find_by_source(&self, window: Window) -> Option<&Projection> {
        self.projections.iter().find(|p| p.state.side_of(window) == Some(Side::Source))
    }

    pub fn find_by_target(&self, window: Window) -> Option<&Projection> {
        self.projections.iter().find(|p| p.state.side_of(window) == Some(Side::Target))
    }

    pub fn find_by_either(&self, window: Window) -> Option<&Projection> {
        self.projections.iter().find(|p| p.state.involves(window))
    }

    pub fn find_by_source_mut(&mut self, window: Window) -> Option<&mut Projection> {
        self.projections.iter_mut().find(|p| p.state.side_of(window) == Some(Side::Source))
    }

    pub fn find_by_target_mut(&mut self, window: Window) -> Option<&mut Projection> {
        self.projections.iter_mut().find(|p| p.state.side_of(window) == Some(Side::Target))
    }

    pub fn find_by_either_mut(&mut self, window: Window) -> Option<&mut Projection> {
        self.projections.iter_mut().find(|p| p.state.involves(window))
    }

    /// Any projection using `window` as either source or target
    pub fn collision(&self, source: Window, target: Window) -> Option<&Projection> {
        self.projections.iter().find(|p| {
            p.state.source == source
                || p.state.source == target
                || p.state.target == source
                || p.state.target == target
        })
    }

    pub(crate) fn insert(&mut self, projection: Projection) {
        self.projections.push(projection);
    }

    /// Take a projection out of the registry.
    ///
    /// # Panics
    /// If the projection is not registered: the lifecycle lost track of it.
    pub(crate) fn remove(&mut self, id: ProjectionId) -> Projection {
        match self.projections.iter().position(|p| p.id == id) {
            Some(index) => self.projections.swap_remove(index),
            None => panic!("internal error: removing projection {:?} not in registry", id),
        }
    }
}
