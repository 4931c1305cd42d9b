use std::sync::Mutex;

use lazy_static::lazy_static;
use primitive_types::U256;

use crate::error::Fault;

/// Maximum number of values on one frame's stack.
pub const STACK_LIMIT: usize = 1024;

/// Bounded EVM word stack. Index 0 is the top.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Stack {
	data: Vec<U256>,
}

impl Stack {
	#[must_use]
	pub fn new() -> Self {
		Self { data: Vec::new() }
	}

	#[must_use]
	pub fn from_values(values: Vec<U256>) -> Self {
		Self { data: values }
	}

	#[inline]
	#[must_use]
	pub fn len(&self) -> usize {
		self.data.len()
	}

	#[inline]
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.data.is_empty()
	}

	/// Values bottom-first, the storage order.
	#[must_use]
	pub fn data(&self) -> &[U256] {
		&self.data
	}

	pub fn clear(&mut self) {
		self.data.clear();
	}

	#[inline]
	pub fn push(&mut self, value: U256) -> Result<(), Fault> {
		if self.data.len() >= STACK_LIMIT {
			return Err(Fault::StackOverflow);
		}
		self.data.push(value);
		Ok(())
	}

	#[inline]
	pub fn pop(&mut self) -> Result<U256, Fault> {
		self.data.pop().ok_or(Fault::StackUnderflow)
	}

	/// Read the value `depth` positions below the top.
	#[inline]
	pub fn peek(&self, depth: usize) -> Result<U256, Fault> {
		if depth < self.data.len() {
			Ok(self.data[self.data.len() - depth - 1])
		} else {
			Err(Fault::StackUnderflow)
		}
	}

	/// Overwrite the value `depth` positions below the top.
	#[inline]
	pub fn set(&mut self, depth: usize, value: U256) -> Result<(), Fault> {
		let len = self.data.len();
		if depth < len {
			self.data[len - depth - 1] = value;
			Ok(())
		} else {
			Err(Fault::StackUnderflow)
		}
	}

	/// DUPn: push a copy of the value `depth - 1` positions below the top.
	pub fn dup(&mut self, depth: usize) -> Result<(), Fault> {
		let value = self.peek(depth - 1)?;
		self.push(value)
	}

	/// SWAPn: exchange the top with the value `depth` positions below it.
	pub fn swap(&mut self, depth: usize) -> Result<(), Fault> {
		let top = self.peek(0)?;
		let other = self.peek(depth)?;
		self.set(0, other)?;
		self.set(depth, top)
	}
}

lazy_static! {
	static ref STACK_POOL: Mutex<Vec<Stack>> = Mutex::new(Vec::new());
}

/// Take a cleared stack from the process-wide pool.
#[must_use]
pub fn acquire_stack() -> Stack {
	STACK_POOL.lock().unwrap().pop().unwrap_or_default()
}

/// Return a stack to the pool. Callers release on every frame exit.
pub fn release_stack(mut stack: Stack) {
	stack.clear();
	let mut pool = STACK_POOL.lock().unwrap();
	if pool.len() < 256 {
		pool.push(stack);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn push_pop_round_trip() {
		let mut stack = Stack::new();
		stack.push(U256::from(1u64)).unwrap();
		stack.push(U256::from(2u64)).unwrap();
		assert_eq!(stack.peek(0).unwrap(), U256::from(2u64));
		assert_eq!(stack.peek(1).unwrap(), U256::from(1u64));
		assert_eq!(stack.pop().unwrap(), U256::from(2u64));
		assert_eq!(stack.pop().unwrap(), U256::from(1u64));
		assert_eq!(stack.pop(), Err(Fault::StackUnderflow));
	}

	#[test]
	fn overflow_at_the_limit() {
		let mut stack = Stack::new();
		for i in 0..STACK_LIMIT {
			stack.push(U256::from(i as u64)).unwrap();
		}
		assert_eq!(stack.push(U256::zero()), Err(Fault::StackOverflow));
		assert_eq!(stack.len(), STACK_LIMIT);
	}

	#[test]
	fn swap_and_dup() {
		let mut stack = Stack::new();
		for i in 1..=4u64 {
			stack.push(U256::from(i)).unwrap();
		}
		stack.swap(3).unwrap();
		assert_eq!(stack.peek(0).unwrap(), U256::from(1u64));
		assert_eq!(stack.peek(3).unwrap(), U256::from(4u64));
		stack.dup(2).unwrap();
		assert_eq!(stack.peek(0).unwrap(), U256::from(3u64));
		assert_eq!(stack.len(), 5);
	}

	#[test]
	fn pooled_stacks_come_back_empty() {
		let mut stack = acquire_stack();
		stack.push(U256::from(7u64)).unwrap();
		release_stack(stack);
		let stack = acquire_stack();
		assert!(stack.is_empty());
		release_stack(stack);
	}
}
