//! Purpose: Decode the capability set a plugin reports for one system.
//! Exports: `Capability`, `Capabilities`.
//! Role: Read-only flags that tell callers which optional operations a plugin supports.
//! Invariants: Byte `i` of the hex bitmap is 1 when capability index `i` is supported.
//! Invariants: Unknown indices are kept (and queryable by index); they are never an error.
#![allow(clippy::result_large_err)]

use super::types::WireObject;
use crate::core::error::{Error, ErrorKind};
use serde::{Deserialize, Serialize};

const SUPPORTED: u8 = 1;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Capability {
    Volumes,
    VolumeCreate,
    VolumeResize,
    VolumeReplicate,
    VolumeReplicateClone,
    VolumeReplicateCopy,
    VolumeReplicateMirrorAsync,
    VolumeReplicateMirrorSync,
    VolumeCopyRangeBlockSize,
    VolumeCopyRange,
    VolumeDelete,
    VolumeOnline,
    VolumeOffline,
    VolumeChildDependency,
    VolumeChildDependencyRm,
    AccessGroups,
    AccessGroupCreate,
    AccessGroupDelete,
    AccessGroupInitiatorAdd,
    AccessGroupInitiatorDelete,
    AccessGroupGrant,
    AccessGroupRevoke,
    Initiators,
    InitiatorGrant,
    InitiatorRevoke,
    IscsiChapAuth,
    Fs,
    FsDelete,
    FsResize,
    FsCreate,
    FsClone,
    FileClone,
    FsSnapshots,
    FsSnapshotCreate,
    FsSnapshotDelete,
    FsSnapshotRevert,
    FsChildDependency,
    FsChildDependencyRm,
    ExportAuth,
    Exports,
    ExportFs,
    ExportRemove,
    Pools,
    PoolCreate,
    PoolCreateFromDisks,
    PoolCreateFromVolumes,
    PoolCreateFromPool,
    PoolDelete,
    Disks,
}

impl Capability {
    pub const ALL: &'static [Capability] = &[
        Capability::Volumes,
        Capability::VolumeCreate,
        Capability::VolumeResize,
        Capability::VolumeReplicate,
        Capability::VolumeReplicateClone,
        Capability::VolumeReplicateCopy,
        Capability::VolumeReplicateMirrorAsync,
        Capability::VolumeReplicateMirrorSync,
        Capability::VolumeCopyRangeBlockSize,
        Capability::VolumeCopyRange,
        Capability::VolumeDelete,
        Capability::VolumeOnline,
        Capability::VolumeOffline,
        Capability::VolumeChildDependency,
        Capability::VolumeChildDependencyRm,
        Capability::AccessGroups,
        Capability::AccessGroupCreate,
        Capability::AccessGroupDelete,
        Capability::AccessGroupInitiatorAdd,
        Capability::AccessGroupInitiatorDelete,
        Capability::AccessGroupGrant,
        Capability::AccessGroupRevoke,
        Capability::Initiators,
        Capability::InitiatorGrant,
        Capability::InitiatorRevoke,
        Capability::IscsiChapAuth,
        Capability::Fs,
        Capability::FsDelete,
        Capability::FsResize,
        Capability::FsCreate,
        Capability::FsClone,
        Capability::FileClone,
        Capability::FsSnapshots,
        Capability::FsSnapshotCreate,
        Capability::FsSnapshotDelete,
        Capability::FsSnapshotRevert,
        Capability::FsChildDependency,
        Capability::FsChildDependencyRm,
        Capability::ExportAuth,
        Capability::Exports,
        Capability::ExportFs,
        Capability::ExportRemove,
        Capability::Pools,
        Capability::PoolCreate,
        Capability::PoolCreateFromDisks,
        Capability::PoolCreateFromVolumes,
        Capability::PoolCreateFromPool,
        Capability::PoolDelete,
        Capability::Disks,
    ];

    /// Position of this capability in the reported bitmap.
    pub fn index(self) -> usize {
        match self {
            Capability::Volumes => 20,
            Capability::VolumeCreate => 21,
            Capability::VolumeResize => 22,
            Capability::VolumeReplicate => 23,
            Capability::VolumeReplicateClone => 24,
            Capability::VolumeReplicateCopy => 25,
            Capability::VolumeReplicateMirrorAsync => 26,
            Capability::VolumeReplicateMirrorSync => 27,
            Capability::VolumeCopyRangeBlockSize => 28,
            Capability::VolumeCopyRange => 29,
            Capability::VolumeDelete => 33,
            Capability::VolumeOnline => 34,
            Capability::VolumeOffline => 35,
            Capability::VolumeChildDependency => 36,
            Capability::VolumeChildDependencyRm => 37,
            Capability::AccessGroups => 40,
            Capability::AccessGroupCreate => 41,
            Capability::AccessGroupDelete => 42,
            Capability::AccessGroupInitiatorAdd => 43,
            Capability::AccessGroupInitiatorDelete => 44,
            Capability::AccessGroupGrant => 45,
            Capability::AccessGroupRevoke => 46,
            Capability::Initiators => 50,
            Capability::InitiatorGrant => 51,
            Capability::InitiatorRevoke => 52,
            Capability::IscsiChapAuth => 53,
            Capability::Fs => 100,
            Capability::FsDelete => 101,
            Capability::FsResize => 102,
            Capability::FsCreate => 103,
            Capability::FsClone => 104,
            Capability::FileClone => 105,
            Capability::FsSnapshots => 106,
            Capability::FsSnapshotCreate => 107,
            Capability::FsSnapshotDelete => 109,
            Capability::FsSnapshotRevert => 110,
            Capability::FsChildDependency => 112,
            Capability::FsChildDependencyRm => 113,
            Capability::ExportAuth => 120,
            Capability::Exports => 121,
            Capability::ExportFs => 122,
            Capability::ExportRemove => 123,
            Capability::Pools => 130,
            Capability::PoolCreate => 131,
            Capability::PoolCreateFromDisks => 132,
            Capability::PoolCreateFromVolumes => 133,
            Capability::PoolCreateFromPool => 134,
            Capability::PoolDelete => 200,
            Capability::Disks => 220,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct CapabilitiesWire {
    cap: String,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Capabilities {
    bitmap: Vec<u8>,
}

impl Capabilities {
    pub fn from_hex(hex: &str) -> Result<Self, Error> {
        if hex.len() % 2 != 0 {
            return Err(Error::new(ErrorKind::PluginBug)
                .with_message("capability bitmap has odd length"));
        }
        let bitmap = hex
            .as_bytes()
            .chunks(2)
            .map(|pair| {
                std::str::from_utf8(pair)
                    .ok()
                    .and_then(|text| u8::from_str_radix(text, 16).ok())
                    .ok_or_else(|| {
                        Error::new(ErrorKind::PluginBug)
                            .with_message("capability bitmap is not hex")
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { bitmap })
    }

    pub fn from_supported(capabilities: &[Capability]) -> Self {
        let len = capabilities
            .iter()
            .map(|capability| capability.index() + 1)
            .max()
            .unwrap_or(0);
        let mut bitmap = vec![0u8; len];
        for capability in capabilities {
            bitmap[capability.index()] = SUPPORTED;
        }
        Self { bitmap }
    }

    pub fn to_hex(&self) -> String {
        self.bitmap.iter().map(|byte| format!("{byte:02x}")).collect()
    }

    pub fn supported(&self, capability: Capability) -> bool {
        self.supported_index(capability.index())
    }

    pub fn supported_index(&self, index: usize) -> bool {
        self.bitmap.get(index) == Some(&SUPPORTED)
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        Capability::ALL
            .iter()
            .copied()
            .filter(|capability| self.supported(*capability))
    }
}

impl Serialize for Capabilities {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        CapabilitiesWire { cap: self.to_hex() }.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Capabilities {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = CapabilitiesWire::deserialize(deserializer)?;
        Capabilities::from_hex(&wire.cap).map_err(serde::de::Error::custom)
    }
}

impl WireObject for Capabilities {
    const CLASS: &'static str = "Capabilities";
}

#[cfg(test)]
mod tests {
    use super::{Capabilities, Capability};
    use crate::api::types::WireObject;
    use crate::core::error::ErrorKind;
    use std::collections::HashSet;

    #[test]
    fn indices_are_unique() {
        let indices: HashSet<_> = Capability::ALL.iter().map(|c| c.index()).collect();
        assert_eq!(indices.len(), Capability::ALL.len());
    }

    #[test]
    fn supported_set_survives_the_wire() {
        let caps = Capabilities::from_supported(&[Capability::Volumes, Capability::VolumeCreate]);
        let value = caps.to_wire().expect("wire");
        assert_eq!(value["class"], "Capabilities");

        let decoded = Capabilities::from_wire("capabilities", value).expect("decode");
        assert!(decoded.supported(Capability::VolumeCreate));
        assert!(!decoded.supported(Capability::VolumeDelete));
        assert_eq!(
            decoded.iter().collect::<Vec<_>>(),
            vec![Capability::Volumes, Capability::VolumeCreate]
        );
    }

    #[test]
    fn values_other_than_one_are_unsupported() {
        let caps = Capabilities::from_hex("000102").expect("hex");
        assert!(!caps.supported_index(0));
        assert!(caps.supported_index(1));
        assert!(!caps.supported_index(2));
        assert!(!caps.supported_index(400));
    }

    #[test]
    fn malformed_bitmap_is_plugin_bug() {
        assert_eq!(Capabilities::from_hex("0").expect_err("err").kind(), ErrorKind::PluginBug);
        assert_eq!(Capabilities::from_hex("zz").expect_err("err").kind(), ErrorKind::PluginBug);
    }
}
