//! Bicubic resampling of rasters, used for the resolution-ratio path.

use crate::error::{InferenceError, InferenceResult};
use burn::tensor::backend::Backend;
use burn::tensor::module::interpolate;
use burn::tensor::ops::{InterpolateMode, InterpolateOptions};
use burn::tensor::{Tensor, TensorData};
use data_contracts::Raster;

/// `(height / ratio, width / ratio)`, rejecting ratios that collapse an axis.
pub fn reduced_shape(height: usize, width: usize, ratio: usize) -> InferenceResult<(usize, usize)> {
    let invalid = InferenceError::InvalidRatio {
        ratio,
        height,
        width,
    };
    if ratio == 0 {
        return Err(invalid);
    }
    let shape = (height / ratio, width / ratio);
    if shape.0 == 0 || shape.1 == 0 {
        return Err(invalid);
    }
    Ok(shape)
}

pub(crate) fn raster_to_tensor<B: Backend>(raster: &Raster, device: &B::Device) -> Tensor<B, 4> {
    let (c, h, w) = raster.shape();
    Tensor::from_data(TensorData::new(raster.data.clone(), [1, c, h, w]), device)
}

/// Reads back the first item of a `[N, C, H, W]` tensor.
pub(crate) fn tensor_to_raster<B: Backend>(tensor: Tensor<B, 4>) -> InferenceResult<Raster> {
    let [_, c, h, w] = tensor.dims();
    let tensor = tensor.slice([0..1, 0..c, 0..h, 0..w]);
    let data = tensor
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| InferenceError::TensorData(format!("{e:?}")))?;
    Ok(Raster::new(c, h, w, data)?)
}

/// Bicubic resize of every channel to `height x width`.
pub fn resize<B: Backend>(
    raster: &Raster,
    height: usize,
    width: usize,
    device: &B::Device,
) -> InferenceResult<Raster> {
    if raster.spatial_shape() == (height, width) {
        return Ok(raster.clone());
    }
    let input = raster_to_tensor::<B>(raster, device);
    let output = interpolate(
        input,
        [height, width],
        InterpolateOptions::new(InterpolateMode::Bicubic),
    );
    let resized = tensor_to_raster(output)?;
    if resized.spatial_shape() != (height, width) {
        return Err(InferenceError::ShapeMismatch {
            expected: (height, width),
            actual: resized.spatial_shape(),
        });
    }
    Ok(resized)
}

/// Shrink by an integer `ratio`; `ratio == 1` is a copy.
pub fn downsample<B: Backend>(
    raster: &Raster,
    ratio: usize,
    device: &B::Device,
) -> InferenceResult<Raster> {
    let (h, w) = reduced_shape(raster.height, raster.width, ratio)?;
    resize::<B>(raster, h, w, device)
}

/// Resize back to `(height, width)` and clamp into `[0, 1]`.
pub fn upsample_probabilities<B: Backend>(
    raster: &Raster,
    height: usize,
    width: usize,
    device: &B::Device,
) -> InferenceResult<Raster> {
    let mut out = resize::<B>(raster, height, width, device)?;
    for v in out.data.iter_mut() {
        *v = v.clamp(0.0, 1.0);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn reduced_shape_floors_and_rejects_collapse() {
        assert_eq!(reduced_shape(65, 64, 2).unwrap(), (32, 32));
        assert!(matches!(
            reduced_shape(3, 64, 4),
            Err(InferenceError::InvalidRatio { ratio: 4, .. })
        ));
        assert!(reduced_shape(64, 64, 0).is_err());
    }

    #[test]
    fn ratio_round_trip_restores_shape_and_range() {
        let device = Default::default();
        let data: Vec<f32> = (0..2 * 30 * 22).map(|i| ((i % 7) as f32) / 6.0).collect();
        let raster = Raster::new(2, 30, 22, data).unwrap();
        let small = downsample::<B>(&raster, 3, &device).unwrap();
        assert_eq!(small.shape(), (2, 10, 7));
        let back = upsample_probabilities::<B>(&small, 30, 22, &device).unwrap();
        assert_eq!(back.shape(), (2, 30, 22));
        assert!(back.data.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn unit_ratio_is_identity() {
        let device = Default::default();
        let raster = Raster::new(1, 2, 2, vec![0.1, 0.2, 0.3, 0.4]).unwrap();
        let same = downsample::<B>(&raster, 1, &device).unwrap();
        assert_eq!(same, raster);
    }
}
