/// Identity of the device being tuned.
#[derive(new, Clone, Debug, PartialEq, Eq, Hash)]
pub struct DeviceInfo {
    /// Name reported by the driver, used to key the persisted state and the export file.
    pub name: String,
    /// Global memory size in bytes.
    pub global_memory: u64,
}
