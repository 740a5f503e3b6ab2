//! Discovery and decoding of an experiment directory.
//!
//! Layout: ground-truth images whose file name contains the labels tag (the
//! first digit run is the case id), plus `mosaic{id}.*` and `DEM{id}.*` for
//! every case. Each case becomes a 4-channel `[R, G, B, DEM]` raster,
//! z-scored per channel.

use crate::types::{DatasetResult, MosaicDatasetError};
use data_contracts::{standardize, BinaryMask, Mosaic, MosaicSet, Raster};
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};

pub const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "tif", "tiff"];

/// Ground-truth pixels darker than this (mean over RGB) are trees.
pub const GT_DARK_THRESHOLD: f32 = 2.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseFiles {
    pub case_id: u32,
    /// Digits exactly as they appear in the file names, leading zeros kept.
    pub label: String,
    pub ground_truth: PathBuf,
    pub mosaic: PathBuf,
    pub dem: PathBuf,
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// First run of ASCII digits in `name`, as written.
pub fn parse_case_label(name: &str) -> Option<&str> {
    let start = name.find(|c: char| c.is_ascii_digit())?;
    let len = name[start..]
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(name.len() - start);
    Some(&name[start..start + len])
}

/// Numeric value of [`parse_case_label`].
pub fn parse_case_id(name: &str) -> Option<u32> {
    parse_case_label(name)?.parse().ok()
}

fn find_with_stem(dir: &Path, stem: &str) -> Option<PathBuf> {
    IMAGE_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{stem}.{ext}")))
        .find(|p| p.is_file())
}

/// Index the cases of `dir`, sorted by ground-truth file name.
pub fn index_cases(dir: &Path, labels_tag: &str) -> DatasetResult<Vec<CaseFiles>> {
    let entries = fs::read_dir(dir).map_err(|source| MosaicDatasetError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut gt_paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| MosaicDatasetError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if !path.is_file() || !has_image_extension(&path) {
            continue;
        }
        let matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.contains(labels_tag));
        if matches {
            gt_paths.push(path);
        }
    }
    gt_paths.sort();
    if gt_paths.is_empty() {
        return Err(MosaicDatasetError::NoCases {
            dir: dir.to_path_buf(),
            tag: labels_tag.to_string(),
        });
    }

    let mut cases = Vec::with_capacity(gt_paths.len());
    for ground_truth in gt_paths {
        let name = ground_truth
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let missing_id = || MosaicDatasetError::MissingCaseId(ground_truth.clone());
        let label = parse_case_label(name).ok_or_else(missing_id)?.to_string();
        let case_id = label.parse::<u32>().map_err(|_| missing_id())?;
        let mosaic_stem = format!("mosaic{label}");
        let mosaic = find_with_stem(dir, &mosaic_stem).ok_or(MosaicDatasetError::MissingFile {
            case_id,
            kind: "mosaic",
            stem: mosaic_stem,
        })?;
        let dem_stem = format!("DEM{label}");
        let dem = find_with_stem(dir, &dem_stem).ok_or(MosaicDatasetError::MissingFile {
            case_id,
            kind: "DEM",
            stem: dem_stem,
        })?;
        cases.push(CaseFiles {
            case_id,
            label,
            ground_truth,
            mosaic,
            dem,
        });
    }
    Ok(cases)
}

fn open_image(path: &Path) -> DatasetResult<image::DynamicImage> {
    image::open(path).map_err(|source| MosaicDatasetError::Image {
        path: path.to_path_buf(),
        source,
    })
}

fn check_shape(
    case_id: u32,
    kind: &'static str,
    expected: (usize, usize),
    actual: (usize, usize),
) -> DatasetResult<()> {
    if expected != actual {
        return Err(MosaicDatasetError::ShapeMismatch {
            case_id,
            kind,
            expected,
            actual,
        });
    }
    Ok(())
}

/// Decode one case into a normalized `[R, G, B, DEM]` mosaic with its mask.
pub fn load_case(files: &CaseFiles) -> DatasetResult<Mosaic> {
    let rgb = open_image(&files.mosaic)?.to_rgb8();
    let (w, h) = rgb.dimensions();
    let (height, width) = (h as usize, w as usize);
    let plane = height * width;

    let mut data = vec![0.0f32; 4 * plane];
    for (i, px) in rgb.pixels().enumerate() {
        for c in 0..3 {
            data[c * plane + i] = px[c] as f32;
        }
    }

    let dem = open_image(&files.dem)?.to_luma8();
    check_shape(
        files.case_id,
        "DEM",
        (height, width),
        (dem.height() as usize, dem.width() as usize),
    )?;
    for (i, px) in dem.pixels().enumerate() {
        data[3 * plane + i] = px[0] as f32;
    }

    let gt = open_image(&files.ground_truth)?.to_rgb8();
    check_shape(
        files.case_id,
        "ground truth",
        (height, width),
        (gt.height() as usize, gt.width() as usize),
    )?;
    let mask_data = gt
        .pixels()
        .map(|px| {
            let mean = (px[0] as f32 + px[1] as f32 + px[2] as f32) / 3.0;
            (mean < GT_DARK_THRESHOLD) as u8
        })
        .collect();

    let mut image = Raster::new(4, height, width, data)?;
    let stats = standardize(&mut image);
    debug!(
        "case {}: {}x{} mean {:?} std {:?}",
        files.case_id, height, width, stats.mean, stats.std
    );
    let mask = BinaryMask::new(height, width, mask_data)?;
    Ok(Mosaic {
        case_id: files.case_id,
        label: files.label.clone(),
        image,
        mask: Some(mask),
    })
}

/// Load and validate every case of an experiment directory.
pub fn load_mosaic_set(dir: &Path, labels_tag: &str) -> DatasetResult<MosaicSet> {
    let cases = index_cases(dir, labels_tag)?;
    info!(
        "loading {} mosaics and DEMs from {}",
        cases.len(),
        dir.display()
    );
    let mosaics = cases.iter().map(load_case).collect::<DatasetResult<Vec<_>>>()?;
    Ok(MosaicSet::new(mosaics)?)
}
