use candle_core::Device;

pub fn select_device() -> Device {
    #[cfg(feature = "metal")]
    {
        if let Ok(dev) = Device::new_metal(0) {
            tracing::info!("Embedding device: Metal (MPS)");
            return dev;
        }
    }
    tracing::info!("Embedding device: CPU");
    Device::Cpu
}
