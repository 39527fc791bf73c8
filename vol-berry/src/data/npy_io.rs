use std::path::Path;

use ndarray::ArrayD;
use ndarray_npy::read_npy;

use super::{into_volume, Volume, VolumeReader};
use crate::error::Result;

/// `.npy` 格式的体数据读取器. 适用于预先缓存的 `f32` 三维或四维数组.
#[derive(Copy, Clone, Debug, Default)]
pub struct NpyReader;

impl VolumeReader for NpyReader {
    fn read(&self, path: &Path) -> Result<Volume> {
        let data: ArrayD<f32> = read_npy(path)?;
        into_volume(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use ndarray_npy::write_npy;

    #[test]
    fn test_read_npy_volume() {
        let mut path = std::env::temp_dir();
        path.push(format!("vol-berry-npy-{}.npy", std::process::id()));

        let data = Array3::<f32>::from_shape_fn((3, 4, 5), |(x, y, z)| (x + y + z) as f32);
        write_npy(&path, &data).unwrap();

        let v = NpyReader.read(&path).unwrap();
        assert_eq!(v.dim(), (3, 4, 5, 1));
        assert_eq!(v[[2, 3, 4, 0]], 9.0);
        assert_eq!(NpyReader.shape(&path).unwrap(), (3, 4, 5));

        std::fs::remove_file(&path).unwrap();
    }
}
