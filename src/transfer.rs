use std::fmt;

use crate::transport::Transport;

pub const OP_TRANSFER: u8 = 1;

// tx: 4'op=1 4'channel+1 16'request_bits 16'response_bits request 32'crc ...
// rx: ................................................... response 32'crc 8'ack
// response phase is clocked with zeros, CRC-32 (IEEE) big-endian
const HEADER_LEN: usize = 5;
const CRC_LEN: usize = 4;
const ACK_LEN: usize = 1;

// ack byte, last byte of the envelope
pub const ACK: u8 = 0x80;
pub const ACK_CRC_OK: u8 = 0x40;
pub const ACK_ACCEPT: u8 = 0x20;
pub const ACK_UNAVAIL: u8 = 0x10;

/// First response byte of a die whose core is fused off.
pub const CORE_DISABLED: u8 = 0x7f;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct TransferStatus(pub u8);

impl TransferStatus {
	pub const ACCEPTED: u8 = 1 << 0;
	pub const ERR_CRC: u8 = 1 << 1;
	pub const ERR_ACK: u8 = 1 << 2;
	pub const ERR_CRCACK: u8 = 1 << 3;
	pub const ERR_UNAVAIL: u8 = 1 << 4;
	pub const ERR_MASK: u8 = !Self::ACCEPTED;

	pub fn is_accepted(self) -> bool {
		self.0 == Self::ACCEPTED
	}

	pub fn is_error(self) -> bool {
		0 != self.0 & Self::ERR_MASK
	}
}

impl fmt::Display for TransferStatus {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{:x}", self.0)
	}
}

/// Outcome of one exchange. The response is returned even when the status
/// reports an error, callers still look at it (disabled cores).
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Transfer {
	pub status: TransferStatus,
	pub response: Vec<u8>,
}

impl Transfer {
	pub fn core_disabled(&self) -> bool {
		self.response.first() == Some(&CORE_DISABLED)
	}
}

/// How a command should continue after an exchange.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Verdict {
	Accepted,
	CoreDisabled,
	Busy,
	Error(TransferStatus),
}

impl Verdict {
	/// Status check for work submissions: error bits win over a missing
	/// accept bit.
	pub fn for_work(transfer: &Transfer) -> Self {
		if transfer.core_disabled() {
			Verdict::CoreDisabled
		} else if transfer.status.is_error() {
			Verdict::Error(transfer.status)
		} else if !transfer.status.is_accepted() {
			Verdict::Busy
		} else {
			Verdict::Accepted
		}
	}

	/// Status check for everything else: any status bit is a failure.
	pub fn for_plain(transfer: &Transfer) -> Self {
		if transfer.core_disabled() {
			Verdict::CoreDisabled
		} else if transfer.status.0 != 0 {
			Verdict::Error(transfer.status)
		} else {
			Verdict::Accepted
		}
	}

	pub fn into_result(self, channel: u8, die: u8) -> Result<(), crate::AsicError> {
		use crate::AsicError;

		match self {
			Verdict::Accepted => Ok(()),
			Verdict::CoreDisabled => Err(AsicError::CoreDisabled { channel, die }),
			Verdict::Busy => Err(AsicError::CoreBusy { channel, die }),
			Verdict::Error(status) => Err(AsicError::TransferError { channel, die, status: status.0 }),
		}
	}
}

pub fn frame_len(request_len: usize, response_len: usize) -> usize {
	HEADER_LEN + request_len + CRC_LEN + response_len + CRC_LEN + ACK_LEN
}

fn crc32(data: &[u8]) -> u32 {
	crc32fast::hash(data)
}

/// Build the tx envelope for `request` on `channel`.
pub fn prepare(channel: u8, request: &[u8], response_len: usize) -> crate::AResult<Vec<u8>> {
	ensure!(channel < 0x0f, "channel {} out of range (0-14)", channel);
	ensure!(request.len() * 8 <= 0xffff, "request of {} bytes too long", request.len());
	ensure!(response_len * 8 <= 0xffff, "response of {} bytes too long", response_len);

	let request_bits = (request.len() * 8) as u16;
	let response_bits = (response_len * 8) as u16;

	let mut tx = vec![0u8; frame_len(request.len(), response_len)];
	tx[0] = OP_TRANSFER << 4 | (channel + 1);
	tx[1..3].copy_from_slice(&request_bits.to_be_bytes());
	tx[3..5].copy_from_slice(&response_bits.to_be_bytes());
	let mut pos = HEADER_LEN;
	tx[pos..pos + request.len()].copy_from_slice(request);
	pos += request.len();
	tx[pos..pos + CRC_LEN].copy_from_slice(&crc32(request).to_be_bytes());

	Ok(tx)
}

/// Extract response and status from the rx side of an envelope.
pub fn decode(rx: &[u8], request_len: usize, response_len: usize) -> crate::AResult<Transfer> {
	let len = frame_len(request_len, response_len);
	ensure!(rx.len() == len, "envelope is {} bytes, expected {}", rx.len(), len);

	let start = HEADER_LEN + request_len + CRC_LEN;
	let response = rx[start..start + response_len].to_vec();
	let crc_pos = start + response_len;
	let mut recv_crc = [0u8; 4];
	recv_crc.copy_from_slice(&rx[crc_pos..crc_pos + CRC_LEN]);
	let ack = rx[len - 1];

	let mut status = 0u8;
	if response_len > 0 && crc32(&response) != u32::from_be_bytes(recv_crc) {
		status |= TransferStatus::ERR_CRC;
	}
	if 0 == ack & ACK {
		status |= TransferStatus::ERR_ACK;
	}
	if 0 == ack & ACK_CRC_OK {
		status |= TransferStatus::ERR_CRCACK;
	}
	if 0 != ack & ACK_UNAVAIL {
		status |= TransferStatus::ERR_UNAVAIL;
	}
	if 0 != ack & ACK_ACCEPT {
		status |= TransferStatus::ACCEPTED;
	}

	Ok(Transfer {
		status: TransferStatus(status),
		response,
	})
}

/// Device side of an envelope: fill `rx` with `response`, its CRC and the
/// ack byte at the offsets the host expects.
pub fn write_device_reply(rx: &mut [u8], request_len: usize, response: &[u8], ack: u8) {
	let start = HEADER_LEN + request_len + CRC_LEN;
	rx[start..start + response.len()].copy_from_slice(response);
	let crc_pos = start + response.len();
	rx[crc_pos..crc_pos + CRC_LEN].copy_from_slice(&crc32(response).to_be_bytes());
	let last = rx.len() - 1;
	rx[last] = ack;
}

/// A tx envelope taken apart again.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Envelope {
	pub channel: u8,
	pub request: Vec<u8>,
	pub response_len: usize,
}

impl Envelope {
	/// Returns `None` unless `tx` is a well-formed envelope with a valid
	/// request CRC.
	pub fn parse(tx: &[u8]) -> Option<Self> {
		if tx.len() < HEADER_LEN || tx[0] >> 4 != OP_TRANSFER || tx[0] & 0x0f == 0 {
			return None;
		}
		let request_bits = u16::from_be_bytes([tx[1], tx[2]]) as usize;
		let response_bits = u16::from_be_bytes([tx[3], tx[4]]) as usize;
		if request_bits % 8 != 0 || response_bits % 8 != 0 {
			return None;
		}
		let (request_len, response_len) = (request_bits / 8, response_bits / 8);
		if tx.len() != frame_len(request_len, response_len) {
			return None;
		}

		let request = &tx[HEADER_LEN..HEADER_LEN + request_len];
		let crc_pos = HEADER_LEN + request_len;
		let mut crc = [0u8; 4];
		crc.copy_from_slice(&tx[crc_pos..crc_pos + CRC_LEN]);
		if crc32(request) != u32::from_be_bytes(crc) {
			return None;
		}

		Some(Envelope {
			channel: (tx[0] & 0x0f) - 1,
			request: request.to_vec(),
			response_len,
		})
	}
}

/// Blocking request/response with one die; no retries.
pub trait SyncTransfer {
	fn channel(&self) -> u8;

	fn transfer(&mut self, request: &[u8], response_len: usize) -> crate::AResult<Transfer>;
}

/// `SyncTransfer` over a transport, bound to one channel.
pub struct Channel<T: Transport> {
	transport: T,
	channel: u8,
}

impl<T: Transport> Channel<T> {
	pub fn new(transport: T, channel: u8) -> Self {
		Channel {
			transport,
			channel,
		}
	}

	pub fn transport(&mut self) -> &mut T {
		&mut self.transport
	}

	pub fn into_inner(self) -> T {
		self.transport
	}
}

impl<T: Transport> SyncTransfer for Channel<T> {
	fn channel(&self) -> u8 {
		self.channel
	}

	fn transfer(&mut self, request: &[u8], response_len: usize) -> crate::AResult<Transfer> {
		let tx = prepare(self.channel, request, response_len)?;
		let mut rx = vec![0u8; tx.len()];
		self.transport.transfer(&tx, &mut rx)?;
		let result = decode(&rx, request.len(), response_len)?;
		debug!("KnC {}: request {} -> status {} response {}",
			self.channel, crate::hex::encode(request), result.status, crate::hex::encode(&result.response)
		);
		Ok(result)
	}
}
