// src/job/selection.rs

//! Axis selectors for looking up job instances.

use crate::job::instance::{Coordinates, StartDate};

/// Selector for one axis. `Any` expands over every value of the axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector<T> {
    Any,
    Only(Vec<T>),
}

impl<T> Default for Selector<T> {
    fn default() -> Self {
        Selector::Any
    }
}

impl<T: PartialEq> Selector<T> {
    pub fn one(value: T) -> Self {
        Selector::Only(vec![value])
    }

    /// An instance that does not vary along the axis (`None`) matches any
    /// selector.
    pub fn matches(&self, value: Option<&T>) -> bool {
        match (self, value) {
            (Selector::Any, _) | (_, None) => true,
            (Selector::Only(values), Some(v)) => values.contains(v),
        }
    }
}

impl<T> From<Option<T>> for Selector<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Selector::Only(vec![v]),
            None => Selector::Any,
        }
    }
}

/// `(date, member, chunk, split)` lookup over a section's instances.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub date: Selector<StartDate>,
    pub member: Selector<String>,
    pub chunk: Selector<u32>,
    pub split: Selector<u32>,
}

impl Selection {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn date(mut self, date: StartDate) -> Self {
        self.date = Selector::one(date);
        self
    }

    pub fn member(mut self, member: impl Into<String>) -> Self {
        self.member = Selector::one(member.into());
        self
    }

    pub fn chunk(mut self, chunk: u32) -> Self {
        self.chunk = Selector::one(chunk);
        self
    }

    pub fn split(mut self, split: u32) -> Self {
        self.split = Selector::one(split);
        self
    }

    pub fn matches(&self, coords: &Coordinates) -> bool {
        self.date.matches(coords.date.as_ref())
            && self.member.matches(coords.member.as_ref())
            && self.chunk.matches(coords.chunk.as_ref())
            && self.split.matches(coords.split.as_ref())
    }
}
