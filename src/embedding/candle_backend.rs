//! Candle runtime helpers: device selection and ndarray/tensor conversion.

use candle_core::{DType, Device, Tensor};
use ndarray::{Array1, Array2};

/// Epsilon shared by every layer norm in the autoencoder.
pub(crate) const LAYER_NORM_EPS: f64 = 1e-3;

/// First GPU built in that can run the hidden blocks' layer norm, else CPU.
pub fn select_device() -> Device {
    for (backend, device) in gpu_devices() {
        if runs_layer_norm(&device) {
            tracing::info!(backend, "Training and embedding on GPU");
            return device;
        }
        tracing::warn!(backend, "GPU cannot run layer norm, skipping");
    }
    tracing::info!("Training and embedding on CPU");
    Device::Cpu
}

#[allow(unused_mut)]
fn gpu_devices() -> Vec<(&'static str, Device)> {
    let mut devices = Vec::new();
    #[cfg(any(feature = "metal", target_os = "macos"))]
    {
        if let Ok(device) = Device::new_metal(0) {
            devices.push(("metal", device));
        }
    }
    #[cfg(feature = "cuda")]
    {
        if let Ok(device) = Device::new_cuda(0) {
            devices.push(("cuda", device));
        }
    }
    devices
}

fn runs_layer_norm(device: &Device) -> bool {
    let normed = Tensor::ones((2, 4), DType::F32, device).and_then(|x| {
        let alpha = Tensor::ones(4, DType::F32, device)?;
        let beta = Tensor::zeros(4, DType::F32, device)?;
        candle_nn::ops::layer_norm(&x, &alpha, &beta, LAYER_NORM_EPS as f32)
    });
    normed.is_ok()
}

/// Row-major copy of a 2-D array onto `device`.
pub fn array2_to_tensor(array: &Array2<f32>, device: &Device) -> candle_core::Result<Tensor> {
    let (rows, cols) = array.dim();
    let data: Vec<f32> = array.iter().copied().collect();
    Tensor::from_vec(data, (rows, cols), device)
}

pub fn array1_to_tensor(array: &Array1<u32>, device: &Device) -> candle_core::Result<Tensor> {
    let data: Vec<u32> = array.iter().copied().collect();
    Tensor::from_vec(data, array.len(), device)
}
