use super::{
	Address,
	ChipProtocol,
	ChipVersion,
	Exchange,
	WorkItem,
	frame,
};
use crate::transfer::{
	SyncTransfer,
	Transfer,
	Verdict,
};

/// First generation. Set-work and halt get no status back worth checking,
/// and a queued work item survives a single halt, so halts always come in
/// pairs.
pub struct Jupiter;

impl Jupiter {
	fn double_halt(&self, link: &mut dyn SyncTransfer, address: &Address) -> crate::AResult<Option<Transfer>> {
		let request = self.halt_frame(address);
		let mut failed = None;
		for _ in 0..2 {
			let transfer = link.transfer(&request, 0)?;
			if failed.is_none() && self.interpret_status(Exchange::Halt, &transfer) != Verdict::Accepted {
				failed = Some(transfer);
			}
		}
		Ok(failed)
	}
}

impl ChipProtocol for Jupiter {
	fn version(&self) -> ChipVersion {
		ChipVersion::Jupiter
	}

	fn setwork_frame(&self, address: &Address, work: Option<&WorkItem>, _clean: bool) -> [u8; frame::SETWORK_REQUEST_LEN] {
		frame::jupiter_setwork(address.die, address.core, address.slot, work)
	}

	fn halt_frame(&self, address: &Address) -> Vec<u8> {
		frame::jupiter_halt(address.die, address.core).to_vec()
	}

	fn interpret_status(&self, exchange: Exchange, transfer: &Transfer) -> Verdict {
		match exchange {
			// the single response byte only tells whether the core exists
			Exchange::SetWork => if transfer.core_disabled() {
				Verdict::CoreDisabled
			} else {
				Verdict::Accepted
			},
			Exchange::Report | Exchange::Halt => Verdict::for_plain(transfer),
		}
	}

	fn set_work(&self, link: &mut dyn SyncTransfer, address: &Address, clean: bool, work: &WorkItem) -> crate::AResult<Option<super::ReportStatus>> {
		if clean {
			if let Some(transfer) = self.double_halt(link, address)? {
				warn!("{}: halt before clean work failed ({})", address, transfer.status);
			}
		}

		let request = self.setwork_frame(address, Some(work), clean);
		let transfer = link.transfer(&request, 1)?;
		self.interpret_status(Exchange::SetWork, &transfer).into_result(address.channel, address.die)?;

		Ok(None)
	}

	fn halt(&self, link: &mut dyn SyncTransfer, address: &Address) -> crate::AResult<()> {
		let empty = self.setwork_frame(&Address { slot: 0, ..*address }, None, false);
		let first = link.transfer(&empty, 0)?;
		let mut failed = match self.interpret_status(Exchange::Halt, &first) {
			Verdict::Accepted => None,
			verdict => Some(verdict),
		};

		if let Some(transfer) = self.double_halt(link, address)? {
			failed = failed.or_else(|| Some(self.interpret_status(Exchange::Halt, &transfer)));
		}

		match failed {
			None => Ok(()),
			Some(verdict) => Ok(verdict.into_result(address.channel, address.die)?),
		}
	}
}
