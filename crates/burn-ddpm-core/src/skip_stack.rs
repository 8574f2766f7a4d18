//! Bounded LIFO stack for UNet skip connections
//!
//! Each encoder stage pushes its output, each decoder stage pops the most
//! recent one. The stack is sized to the stage count up front, so an extra
//! push or pop is reported instead of silently growing or panicking.

use burn::prelude::*;
use thiserror::Error;

/// Misuse of a [`SkipStack`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipStackError {
    /// Push beyond the configured capacity
    #[error("skip stack overflow: capacity is {capacity}")]
    Overflow { capacity: usize },

    /// Pop from an empty stack
    #[error("skip stack underflow: no skip tensor left to pop")]
    Underflow,

    /// Stack not empty when the decoder finished
    #[error("skip stack unbalanced: {remaining} skip tensor(s) left after decoding")]
    Unbalanced { remaining: usize },
}

/// Fixed-capacity stack of intermediate feature maps
#[derive(Debug)]
pub struct SkipStack<B: Backend> {
    items: Vec<Tensor<B, 4>>,
    capacity: usize,
    pushes: usize,
    pops: usize,
}

impl<B: Backend> SkipStack<B> {
    /// Creates an empty stack holding at most `capacity` tensors
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
            pushes: 0,
            pops: 0,
        }
    }

    /// Pushes an encoder output
    pub fn push(&mut self, x: Tensor<B, 4>) -> Result<(), SkipStackError> {
        if self.items.len() == self.capacity {
            return Err(SkipStackError::Overflow {
                capacity: self.capacity,
            });
        }
        self.items.push(x);
        self.pushes += 1;
        Ok(())
    }

    /// Pops the most recently pushed tensor
    pub fn pop(&mut self) -> Result<Tensor<B, 4>, SkipStackError> {
        let x = self.items.pop().ok_or(SkipStackError::Underflow)?;
        self.pops += 1;
        Ok(x)
    }

    /// Consumes the stack, failing if any tensor was never popped
    pub fn finish(self) -> Result<(), SkipStackError> {
        if self.items.is_empty() {
            Ok(())
        } else {
            Err(SkipStackError::Unbalanced {
                remaining: self.items.len(),
            })
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total pushes since creation
    pub fn pushes(&self) -> usize {
        self.pushes
    }

    /// Total pops since creation
    pub fn pops(&self) -> usize {
        self.pops
    }
}
