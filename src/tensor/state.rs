use std::fmt::{Display, Formatter, Result as FmtResult};

/// Residency state of a tensor tracked by the pool.
///
/// `Freed` is terminal. Residency changes only through explicit transfers:
///
/// ```text
/// HostResident  --to_device-->   DeviceResident
/// DeviceResident --from_device--> HostResident
/// HostResident | DeviceResident --deallocate--> Freed
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TensorState {
    HostResident,
    DeviceResident,
    Freed,
}

impl TensorState {
    pub fn can_transition_to(self, next: TensorState) -> bool {
        matches!(
            (self, next),
            (TensorState::HostResident, TensorState::DeviceResident)
                | (TensorState::DeviceResident, TensorState::HostResident)
                | (TensorState::HostResident, TensorState::Freed)
                | (TensorState::DeviceResident, TensorState::Freed)
        )
    }

    pub fn is_allocated(self) -> bool {
        !matches!(self, TensorState::Freed)
    }
}

impl Display for TensorState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            TensorState::HostResident => "HostResident",
            TensorState::DeviceResident => "DeviceResident",
            TensorState::Freed => "Freed",
        };
        f.write_str(name)
    }
}
