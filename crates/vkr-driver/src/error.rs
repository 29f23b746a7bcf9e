#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("failed to load the Vulkan loader: {0}")]
    Load(#[from] ash::LoadingError),
}
