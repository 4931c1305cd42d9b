macro_rules! pop {
	($frame:expr, $($var:ident),* $(,)?) => {
		$(let $var = $frame.stack.pop()?;)*
	};
}

macro_rules! push {
	($frame:expr, $value:expr) => {
		$frame.stack.push($value)?
	};
}

/// Pop two values, push the result, advance the program counter.
macro_rules! binary_op {
	($frame:expr, $fun:expr) => {{
		pop!($frame, a, b);
		push!($frame, $fun(a, b));
		$frame.pc += 1;
		Ok(())
	}};
}

/// Like `binary_op!`, with a boolean result encoded as 0 or 1.
macro_rules! compare_op {
	($frame:expr, $fun:expr) => {{
		pop!($frame, a, b);
		push!(
			$frame,
			if $fun(a, b) {
				primitive_types::U256::one()
			} else {
				primitive_types::U256::zero()
			}
		);
		$frame.pc += 1;
		Ok(())
	}};
}
