use std::fmt::Write;

/// Parse up to two characters the way `strtoul(s, NULL, 16)` would and
/// truncate to a byte.
fn parse_octet(s: &[u8]) -> u8 {
	let mut rest = s;
	while let Some((&c, tail)) = rest.split_first() {
		if !c.is_ascii_whitespace() {
			break;
		}
		rest = tail;
	}

	let mut negative = false;
	if let Some((&c, tail)) = rest.split_first() {
		if c == b'+' || c == b'-' {
			negative = c == b'-';
			rest = tail;
		}
	}

	let mut value = 0u64;
	for &c in rest {
		match (c as char).to_digit(16) {
			Some(d) => value = value * 16 + d as u64,
			None => break,
		}
	}

	if negative {
		value = value.wrapping_neg();
	}
	value as u8
}

/// Decode `src` into `dst`, returning the number of bytes written.
///
/// `dst` is zeroed first. With a `0x`/`0X` prefix the bytes are stored
/// starting at the end of `dst`, moving backwards; the returned count is
/// then the number of trailing bytes filled, not an offset.
///
/// A lone trailing character is decoded as the octet `"0" + c`.
pub fn decode(dst: &mut [u8], src: &str) -> usize {
	for b in dst.iter_mut() {
		*b = 0;
	}

	let mut src = src.as_bytes();
	let reverse = src.starts_with(b"0x") || src.starts_with(b"0X");
	if reverse {
		src = &src[2..];
	}

	let max_len = dst.len();
	let mut len = 0;
	while !src.is_empty() && len < max_len {
		let value = if src.len() >= 2 {
			let v = parse_octet(&src[..2]);
			src = &src[2..];
			v
		} else {
			let v = parse_octet(&[b'0', src[0]]);
			src = &src[1..];
			v
		};

		let pos = if reverse { max_len - 1 - len } else { len };
		dst[pos] = value;
		len += 1;
	}

	len
}

/// Lowercase hex without separators.
pub fn encode(data: &[u8]) -> String {
	let mut s = String::with_capacity(data.len() * 2);
	for b in data {
		write!(s, "{:02x}", b).expect("writing to a String can't fail");
	}
	s
}

/// Check that `src` is well-formed hex for a buffer of `max_len` bytes.
///
/// `decode` never fails; this only tells the caller whether the input was
/// decoded as the operator most likely meant.
pub fn check(src: &str, max_len: usize) -> crate::AResult<()> {
	let digits = if src.starts_with("0x") || src.starts_with("0X") {
		&src[2..]
	} else {
		src
	};
	if let Some(c) = digits.chars().find(|c| !c.is_ascii_hexdigit()) {
		bail!("invalid hex character {:?} in {:?}", c, src);
	}
	ensure!(digits.len() % 2 == 0, "odd number of hex digits in {:?}", src);
	ensure!(digits.len() / 2 <= max_len, "{:?} is longer than {} bytes", src, max_len);
	Ok(())
}
