//! Image cleanup ahead of OCR.
//!
//! Scans and phone photos of CVs come with uneven lighting, paper texture and
//! JPEG noise. The pipeline here is: grayscale, non-local-means denoise,
//! adaptive Gaussian threshold, morphological closing. The output only holds
//! 0 and 255 and keeps the input's dimensions.

use image::{DynamicImage, GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::filter::separable_filter_equal;
use imageproc::morphology::close;
use serde::{Deserialize, Serialize};

/// Tunables for [`Preprocessor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Run the denoising step at all.
    pub denoise: bool,
    /// Filter strength `h`; higher removes more noise and more detail.
    pub denoise_strength: f32,
    /// Side of the square patch compared between pixels (odd).
    pub template_window: u32,
    /// Side of the square area searched for similar patches (odd).
    pub search_window: u32,
    /// Neighbourhood used for the local threshold (odd, >= 3).
    pub block_size: u32,
    /// Subtracted from the local Gaussian mean before comparing.
    pub threshold_offset: i32,
    /// Radius of the square closing element; 0 is a 1x1 kernel.
    pub close_radius: u8,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            denoise: true,
            denoise_strength: 3.0,
            template_window: 7,
            search_window: 21,
            block_size: 11,
            threshold_offset: 2,
            close_radius: 0,
        }
    }
}

/// Deterministic image-to-image transform applied before every OCR engine.
#[derive(Debug, Clone, Default)]
pub struct Preprocessor {
    config: PreprocessConfig,
}

impl Preprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    /// Run the full pipeline.
    pub fn process(&self, image: &DynamicImage) -> GrayImage {
        let gray = to_grayscale(image);
        let denoised = if self.config.denoise {
            non_local_means(
                &gray,
                self.config.denoise_strength,
                self.config.template_window,
                self.config.search_window,
            )
        } else {
            gray
        };
        self.binarize(&denoised)
    }

    /// Threshold and closing only, for images that are already clean.
    pub fn binarize(&self, gray: &GrayImage) -> GrayImage {
        let thresholded =
            adaptive_gaussian_threshold(gray, self.config.block_size, self.config.threshold_offset);
        close(&thresholded, Norm::LInf, self.config.close_radius)
    }
}

/// Convert to single-channel 8-bit, leaving grayscale input untouched.
pub fn to_grayscale(image: &DynamicImage) -> GrayImage {
    match image {
        DynamicImage::ImageLuma8(gray) => gray.clone(),
        other => other.to_luma8(),
    }
}

/// Map a possibly out-of-range coordinate back into `0..n` by mirroring
/// around the edge pixels (`dcb|abcd|cba`).
fn reflect(i: i64, n: i64) -> u32 {
    if n <= 1 {
        return 0;
    }
    let period = 2 * (n - 1);
    let mut m = i.rem_euclid(period);
    if m >= n {
        m = period - m;
    }
    m as u32
}

/// Non-local-means denoising.
///
/// Each output pixel is a weighted mean of the pixels in its search window,
/// weighted by how similar their surrounding patches are. Patch distances are
/// computed per search offset with an integral image, so the cost is
/// `O(pixels * search_window^2)` rather than also scaling with the patch size.
/// Row bands are processed on separate threads; the result does not depend
/// on how many.
pub fn non_local_means(
    image: &GrayImage,
    strength: f32,
    template_window: u32,
    search_window: u32,
) -> GrayImage {
    let threads = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .clamp(1, 8);
    non_local_means_banded(image, strength, template_window, search_window, threads)
}

fn non_local_means_banded(
    image: &GrayImage,
    strength: f32,
    template_window: u32,
    search_window: u32,
    threads: usize,
) -> GrayImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 || strength <= 0.0 {
        return image.clone();
    }

    let t = (template_window.max(1) / 2) as usize;
    let s = (search_window.max(1) / 2) as usize;
    let h2 = (strength as f64) * (strength as f64);
    let params = NlmParams {
        t,
        s,
        h2,
        patch_area: ((2 * t + 1) * (2 * t + 1)) as f64,
    };
    let weights = WeightTable::new(&params);
    let padded = Padded::new(image, t + s);

    let w = width as usize;
    let rows_per_band = (height as usize).div_ceil(threads.max(1));
    let mut out = GrayImage::new(width, height);
    std::thread::scope(|scope| {
        for (band, rows) in out.chunks_mut(rows_per_band * w).enumerate() {
            let (padded, weights, params) = (&padded, &weights, &params);
            scope.spawn(move || {
                denoise_band(padded, weights, params, band * rows_per_band, rows)
            });
        }
    });
    out
}

#[derive(Debug, Clone, Copy)]
struct NlmParams {
    /// Patch radius.
    t: usize,
    /// Search radius.
    s: usize,
    h2: f64,
    patch_area: f64,
}

/// Source pixels with a mirrored border of `pad`, stored row-major.
struct Padded {
    data: Vec<u8>,
    stride: usize,
    pad: usize,
    width: usize,
}

impl Padded {
    fn new(image: &GrayImage, pad: usize) -> Self {
        let (width, height) = image.dimensions();
        let (w, h) = (width as i64, height as i64);
        let stride = width as usize + 2 * pad;
        let rows = height as usize + 2 * pad;
        let raw = image.as_raw();

        let columns: Vec<usize> = (0..stride)
            .map(|px| reflect(px as i64 - pad as i64, w) as usize)
            .collect();
        let mut data = Vec::with_capacity(stride * rows);
        for py in 0..rows {
            let sy = reflect(py as i64 - pad as i64, h) as usize;
            let row = &raw[sy * width as usize..(sy + 1) * width as usize];
            data.extend(columns.iter().map(|&sx| row[sx]));
        }

        Self {
            data,
            stride,
            pad,
            width: width as usize,
        }
    }

    /// Pixel at source coordinates, which may be up to `pad` outside the image.
    #[inline]
    fn at(&self, x: isize, y: isize) -> u8 {
        let px = (x + self.pad as isize) as usize;
        let py = (y + self.pad as isize) as usize;
        self.data[py * self.stride + px]
    }
}

/// Beyond this exponent a patch contributes nothing measurable.
const MAX_EXPONENT: f64 = 30.0;
const MAX_TABLE_LEN: usize = 1 << 22;

/// `exp(-(distance / area) / h^2)` indexed by the integer patch distance,
/// when the table is small enough to build.
struct WeightTable {
    table: Option<Vec<f64>>,
    h2: f64,
    patch_area: f64,
}

impl WeightTable {
    fn new(params: &NlmParams) -> Self {
        let len = (MAX_EXPONENT * params.h2 * params.patch_area).ceil() as usize + 1;
        let table = (len <= MAX_TABLE_LEN).then(|| {
            (0..len)
                .map(|sum| (-(sum as f64 / params.patch_area) / params.h2).exp())
                .collect()
        });
        Self {
            table,
            h2: params.h2,
            patch_area: params.patch_area,
        }
    }

    #[inline]
    fn weight(&self, sum: u64) -> f64 {
        match &self.table {
            Some(table) => table.get(sum as usize).copied().unwrap_or(0.0),
            None => (-(sum as f64 / self.patch_area) / self.h2).exp(),
        }
    }
}

/// Denoise output rows `first_row..` into `rows` (whole image rows).
fn denoise_band(
    padded: &Padded,
    weights: &WeightTable,
    params: &NlmParams,
    first_row: usize,
    rows: &mut [u8],
) {
    let w = padded.width;
    let band_height = rows.len() / w;
    let t = params.t as isize;
    let s = params.s as isize;
    let y0 = first_row as isize;

    // Integral of squared differences over the band's patch grid, which
    // extends `t` past the band on every side.
    let gw = w + 2 * params.t;
    let gh = band_height + 2 * params.t;
    let stride = gw + 1;
    let mut integral = vec![0u64; stride * (gh + 1)];

    let mut acc = vec![0f64; rows.len()];
    let mut total = vec![0f64; rows.len()];
    let span = 2 * params.t + 1;

    for dy in -s..=s {
        for dx in -s..=s {
            for gy in 0..gh {
                let y = y0 + gy as isize - t;
                let mut row_sum = 0u64;
                for gx in 0..gw {
                    let x = gx as isize - t;
                    let d = padded.at(x, y) as i64 - padded.at(x + dx, y + dy) as i64;
                    row_sum += (d * d) as u64;
                    integral[(gy + 1) * stride + gx + 1] = integral[gy * stride + gx + 1] + row_sum;
                }
            }

            for ly in 0..band_height {
                let top = ly * stride;
                let bottom = (ly + span) * stride;
                for lx in 0..w {
                    let sum = (integral[bottom + lx + span] + integral[top + lx])
                        - (integral[top + lx + span] + integral[bottom + lx]);
                    let weight = weights.weight(sum);
                    if weight == 0.0 {
                        continue;
                    }
                    let i = ly * w + lx;
                    let neighbour = padded.at(lx as isize + dx, y0 + ly as isize + dy);
                    acc[i] += weight * neighbour as f64;
                    total[i] += weight;
                }
            }
        }
    }

    for (i, out) in rows.iter_mut().enumerate() {
        *out = (acc[i] / total[i]).round().clamp(0.0, 255.0) as u8;
    }
}

/// Normalized 1-D Gaussian kernel of odd length `size`.
///
/// Sigma follows the usual derivation from the aperture size:
/// `0.3 * ((size - 1) * 0.5 - 1) + 0.8`.
fn gaussian_kernel(size: u32) -> Vec<f32> {
    let size = size.max(1) | 1;
    let sigma = 0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let radius = (size / 2) as i32;
    let mut kernel: Vec<f32> = (-radius..=radius)
        .map(|i| (-((i * i) as f32) / (2.0 * sigma * sigma)).exp())
        .collect();
    let total: f32 = kernel.iter().sum();
    for k in &mut kernel {
        *k /= total;
    }
    kernel
}

/// Binarize against a Gaussian-weighted local mean.
///
/// A pixel becomes white when it is brighter than `mean - offset`, black
/// otherwise. Borders replicate the edge pixels.
pub fn adaptive_gaussian_threshold(image: &GrayImage, block_size: u32, offset: i32) -> GrayImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }
    let kernel = gaussian_kernel(block_size.max(3));
    let means = separable_filter_equal(image, &kernel);
    GrayImage::from_fn(width, height, |x, y| {
        let mean = means.get_pixel(x, y)[0] as i32;
        let value = image.get_pixel(x, y)[0] as i32;
        if value > mean - offset {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    /// White page with one thin dark horizontal rule, like a form line.
    fn ruled_page() -> GrayImage {
        GrayImage::from_fn(40, 32, |_, y| if y == 16 { Luma([20]) } else { Luma([235]) })
    }

    fn small_config() -> PreprocessConfig {
        PreprocessConfig {
            template_window: 3,
            search_window: 7,
            ..PreprocessConfig::default()
        }
    }

    #[test]
    fn test_reflect_mirrors_edges() {
        assert_eq!(reflect(-1, 5), 1);
        assert_eq!(reflect(-2, 5), 2);
        assert_eq!(reflect(5, 5), 3);
        assert_eq!(reflect(6, 5), 2);
        assert_eq!(reflect(3, 5), 3);
        assert_eq!(reflect(-7, 1), 0);
    }

    #[test]
    fn test_gaussian_kernel_is_normalized_and_symmetric() {
        let kernel = gaussian_kernel(11);
        assert_eq!(kernel.len(), 11);
        let total: f32 = kernel.iter().sum();
        assert!((total - 1.0).abs() < 1e-5);
        for i in 0..5 {
            assert!((kernel[i] - kernel[10 - i]).abs() < 1e-6);
        }
        assert!(kernel[5] > kernel[4]);
    }

    #[test]
    fn test_output_is_binary_and_same_size() {
        let rgb = RgbImage::from_fn(24, 18, |x, y| {
            let v = ((x * 7 + y * 13) % 256) as u8;
            Rgb([v, v / 2, 255 - v])
        });
        let out = Preprocessor::new(small_config()).process(&DynamicImage::ImageRgb8(rgb));
        assert_eq!(out.dimensions(), (24, 18));
        assert!(out.pixels().all(|p| p[0] == 0 || p[0] == 255));
    }

    #[test]
    fn test_thin_rule_survives_as_black() {
        let out = Preprocessor::new(small_config()).process(&DynamicImage::ImageLuma8(ruled_page()));
        for x in 0..40 {
            assert_eq!(out.get_pixel(x, 16)[0], 0, "rule pixel at x={}", x);
            assert_eq!(out.get_pixel(x, 5)[0], 255);
        }
    }

    #[test]
    fn test_preprocessing_binarized_output_is_stable() {
        let pre = Preprocessor::new(small_config());
        let once = pre.process(&DynamicImage::ImageLuma8(ruled_page()));
        let twice = pre.process(&DynamicImage::ImageLuma8(once.clone()));
        let thrice = pre.process(&DynamicImage::ImageLuma8(twice.clone()));
        assert_eq!(once, twice);
        assert_eq!(twice, thrice);
    }

    #[test]
    fn test_binarize_is_idempotent_on_binary_input() {
        let pre = Preprocessor::default();
        let once = pre.binarize(&ruled_page());
        assert_eq!(pre.binarize(&once), once);
    }

    #[test]
    fn test_uniform_image_stays_uniform_after_denoise() {
        let flat = GrayImage::from_pixel(12, 9, Luma([180]));
        assert_eq!(non_local_means(&flat, 3.0, 7, 21), flat);
    }

    #[test]
    fn test_denoise_result_does_not_depend_on_band_count() {
        let page = GrayImage::from_fn(23, 17, |x, y| Luma([((x * 31 + y * 17 + x * y) % 256) as u8]));
        let single = non_local_means_banded(&page, 12.0, 3, 7, 1);
        for threads in [2, 3, 5, 64] {
            assert_eq!(non_local_means_banded(&page, 12.0, 3, 7, threads), single);
        }
    }

    #[test]
    fn test_padding_mirrors_source() {
        let page = GrayImage::from_fn(5, 3, |x, y| Luma([(y * 5 + x) as u8]));
        let padded = Padded::new(&page, 2);
        assert_eq!(padded.at(0, 0), 0);
        assert_eq!(padded.at(-1, 0), 1);
        assert_eq!(padded.at(5, 2), 13);
        assert_eq!(padded.at(4, -2), 14);
    }

    #[test]
    fn test_threshold_replicates_borders() {
        // Edge column slightly darker than the page. Replicated borders put
        // its local mean near 154 (white at offset 6); mirrored borders would
        // pull it up to 158 and turn it black.
        let page = GrayImage::from_fn(12, 12, |x, _| if x == 0 { Luma([150]) } else { Luma([160]) });
        let out = adaptive_gaussian_threshold(&page, 11, 6);
        for y in 0..12 {
            assert_eq!(out.get_pixel(0, y)[0], 255, "edge pixel at y={}", y);
            assert_eq!(out.get_pixel(6, y)[0], 255);
        }
    }

    #[test]
    fn test_denoise_removes_isolated_speck() {
        let mut page = GrayImage::from_pixel(16, 16, Luma([200]));
        page.put_pixel(8, 8, Luma([203]));
        let out = non_local_means(&page, 10.0, 3, 7);
        assert_eq!(out.get_pixel(8, 8)[0], 200);
    }
}
