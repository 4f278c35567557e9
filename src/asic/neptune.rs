use super::{
	Address,
	ChipProtocol,
	ChipVersion,
	Exchange,
	ReportStatus,
	WorkItem,
	frame,
};
use crate::transfer::{
	SyncTransfer,
	Transfer,
	Verdict,
};

/// Second generation: every exchange is one round-trip with a checked
/// status, and set-work answers with a full report.
pub struct Neptune;

impl ChipProtocol for Neptune {
	fn version(&self) -> ChipVersion {
		ChipVersion::Neptune
	}

	fn setwork_frame(&self, address: &Address, work: Option<&WorkItem>, clean: bool) -> [u8; frame::SETWORK_REQUEST_LEN] {
		frame::neptune_setwork(address.die, address.core, address.slot, work, clean)
	}

	fn halt_frame(&self, address: &Address) -> Vec<u8> {
		frame::neptune_halt(address.die, address.core).to_vec()
	}

	fn interpret_status(&self, exchange: Exchange, transfer: &Transfer) -> Verdict {
		match exchange {
			Exchange::SetWork => Verdict::for_work(transfer),
			Exchange::Report | Exchange::Halt => Verdict::for_plain(transfer),
		}
	}

	fn set_work(&self, link: &mut dyn SyncTransfer, address: &Address, clean: bool, work: &WorkItem) -> crate::AResult<Option<ReportStatus>> {
		let request = self.setwork_frame(address, Some(work), clean);
		let transfer = link.transfer(&request, self.report_response_len())?;
		self.interpret_status(Exchange::SetWork, &transfer).into_result(address.channel, address.die)?;
		Ok(Some(self.decode_report(&transfer.response)?))
	}

	fn halt(&self, link: &mut dyn SyncTransfer, address: &Address) -> crate::AResult<()> {
		let request = self.halt_frame(address);
		let transfer = link.transfer(&request, 0)?;
		Ok(self.interpret_status(Exchange::Halt, &transfer).into_result(address.channel, address.die)?)
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::transfer::{
		ACK,
		ACK_CRC_OK,
		ACK_UNAVAIL,
		Channel,
	};
	use crate::transport::{
		MockTransport,
		Reply,
	};
	use crate::AsicError;

	fn work() -> WorkItem {
		WorkItem::new([0x11; 32], [0x22; 76])
	}

	fn address() -> Address {
		Address::core(1, 2, 0x0105).with_slot(4).unwrap()
	}

	fn error_of(e: &failure::Error) -> &AsicError {
		e.downcast_ref::<AsicError>().expect("typed error")
	}

	#[test]
	fn accepted_work_returns_report() {
		let mut resp = [0u8; 27];
		resp[0] = 0x34;
		let mut mock = MockTransport::new();
		mock.push_reply(Reply::accepted(&resp));
		let r = Neptune.set_work(&mut Channel::new(&mut mock, 1), &address(), true, &work()).unwrap().unwrap();
		assert_eq!(r.next_slot, Some(4));
		assert_eq!(r.hashing, Some(true));

		let requests = mock.asic_requests();
		assert_eq!(requests.len(), 1);
		assert_eq!(&requests[0][..5], &[frame::CMD_SETWORK_CLEAN, 2, 0x01, 0x05, 4]);
	}

	#[test]
	fn busy_core_skips_report() {
		let mut mock = MockTransport::new();
		mock.push_reply(Reply::ok(&[0u8; 27]));
		let e = Neptune.set_work(&mut Channel::new(&mut mock, 1), &address(), false, &work()).unwrap_err();
		match error_of(&e) {
			AsicError::CoreBusy { channel: 1, die: 2 } => (),
			other => panic!("unexpected {:?}", other),
		}
	}

	#[test]
	fn error_bits_win_over_busy() {
		let mut mock = MockTransport::new();
		mock.push_reply(Reply::Asic { response: vec![0u8; 27], ack: ACK | ACK_CRC_OK | ACK_UNAVAIL });
		let e = Neptune.set_work(&mut Channel::new(&mut mock, 1), &address(), false, &work()).unwrap_err();
		match error_of(&e) {
			AsicError::TransferError { status, .. } => assert_eq!(*status, crate::transfer::TransferStatus::ERR_UNAVAIL),
			other => panic!("unexpected {:?}", other),
		}
	}

	#[test]
	fn disabled_core() {
		let mut resp = [0u8; 27];
		resp[0] = 0x7f;
		let mut mock = MockTransport::new();
		mock.push_reply(Reply::Asic { response: resp.to_vec(), ack: ACK });
		let e = Neptune.set_work(&mut Channel::new(&mut mock, 1), &address(), false, &work()).unwrap_err();
		match error_of(&e) {
			AsicError::CoreDisabled { .. } => (),
			other => panic!("unexpected {:?}", other),
		}
	}

	#[test]
	fn halt_is_one_clean_setwork() {
		let mut mock = MockTransport::new();
		mock.push_reply(Reply::ok(&[]));
		Neptune.halt(&mut Channel::new(&mut mock, 1), &address()).unwrap();
		assert_eq!(mock.asic_requests(), vec![frame::neptune_halt(2, 0x0105).to_vec()]);
	}

	#[test]
	fn failed_halt_is_reported() {
		let mut mock = MockTransport::new();
		mock.push_reply(Reply::Asic { response: vec![], ack: ACK });
		let e = Neptune.halt(&mut Channel::new(&mut mock, 1), &address()).unwrap_err();
		match error_of(&e) {
			AsicError::TransferError { channel: 1, die: 2, status } => assert_eq!(*status, crate::transfer::TransferStatus::ERR_CRCACK),
			other => panic!("unexpected {:?}", other),
		}
		assert_eq!(mock.asic_requests().len(), 1);
	}

	#[test]
	fn failed_report_is_not_decoded() {
		let mut mock = MockTransport::new();
		mock.push_reply(Reply::Asic { response: vec![0u8; 27], ack: ACK });
		let e = Neptune.report(&mut Channel::new(&mut mock, 1), &address()).unwrap_err();
		match error_of(&e) {
			AsicError::TransferError { status, .. } => assert_eq!(*status, crate::transfer::TransferStatus::ERR_CRCACK),
			other => panic!("unexpected {:?}", other),
		}
	}
}
