//! FEC decoder used when no error correction is configured.

use crate::error::FecError;
use crate::ports::outbound::{FecDecoder, RepairRequest, RepairTarget};

/// Disabled FEC. Every repair attempt fails with `FecError::Disabled`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFec;

impl FecDecoder for NoFec {
    fn is_enabled(&self) -> bool {
        false
    }

    fn repair(&self, _request: &RepairRequest<'_>, _target: RepairTarget<'_>) -> Result<(), FecError> {
        Err(FecError::Disabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::BlockType;

    #[test]
    fn test_no_fec_refuses() {
        let fec = NoFec;
        let mut buf = vec![0u8; 8];
        let request = RepairRequest {
            block_type: BlockType::Data,
            block: 1,
            want_digest: &[0u8; 32],
        };
        assert!(!fec.is_enabled());
        assert!(matches!(
            fec.repair(&request, RepairTarget::Buffer(&mut buf)),
            Err(FecError::Disabled)
        ));
        assert!(fec.table_args().is_empty());
    }
}
