use std::collections::VecDeque;

use super::Transport;
use crate::transfer;

/// What the mock answers to the next transfer.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Reply {
	/// ASIC answer inside a synchronous-transfer envelope: response bytes
	/// plus the ack byte, with a correct response CRC.
	Asic {
		response: Vec<u8>,
		ack: u8,
	},
	/// Bytes clocked back verbatim (board controller commands); padded with
	/// zeros or cut to the frame length.
	Raw(Vec<u8>),
}

impl Reply {
	/// Clean ASIC answer with the ack and request-CRC bits set.
	pub fn ok(response: &[u8]) -> Self {
		Reply::Asic {
			response: response.to_vec(),
			ack: transfer::ACK | transfer::ACK_CRC_OK,
		}
	}

	/// Like `ok`, but the ASIC also took the work.
	pub fn accepted(response: &[u8]) -> Self {
		Reply::Asic {
			response: response.to_vec(),
			ack: transfer::ACK | transfer::ACK_CRC_OK | transfer::ACK_ACCEPT,
		}
	}
}

/// Scripted stand-in for the controller; records every frame sent.
///
/// Transfers without a scripted reply read back all zeros.
#[derive(Default, Debug)]
pub struct MockTransport {
	replies: VecDeque<Reply>,
	sent: Vec<Vec<u8>>,
}

impl MockTransport {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn push_reply(&mut self, reply: Reply) {
		self.replies.push_back(reply);
	}

	/// All raw frames in the order they were clocked out.
	pub fn sent(&self) -> &[Vec<u8>] {
		&self.sent
	}

	/// ASIC requests unwrapped from the synchronous-transfer envelopes sent
	/// so far; frames that aren't envelopes are skipped.
	pub fn asic_requests(&self) -> Vec<Vec<u8>> {
		self.sent.iter()
			.filter_map(|frame| transfer::Envelope::parse(frame))
			.map(|env| env.request)
			.collect()
	}
}

impl Transport for MockTransport {
	fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> crate::AResult<()> {
		ensure!(tx.len() == rx.len(), "mock transfer needs equal buffers");
		self.sent.push(tx.to_vec());

		for b in rx.iter_mut() {
			*b = 0;
		}

		match self.replies.pop_front() {
			None => (),
			Some(Reply::Raw(data)) => {
				let n = data.len().min(rx.len());
				rx[..n].copy_from_slice(&data[..n]);
			},
			Some(Reply::Asic { response, ack }) => {
				let env = transfer::Envelope::parse(tx)
					.ok_or_else(|| format_err!("mock: ASIC reply scripted for a non-envelope frame"))?;
				ensure!(env.response_len == response.len(),
					"mock: scripted {} response bytes, request expects {}", response.len(), env.response_len
				);
				transfer::write_device_reply(rx, env.request.len(), &response, ack);
			},
		}

		Ok(())
	}
}
