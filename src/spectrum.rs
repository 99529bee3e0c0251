//! Sample spectra and the integer-bin mass tolerance index.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{MimiError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    pub mass: f64,
    pub intensity: f64,
}

#[derive(Debug)]
/// A sample spectrum with peaks sorted ascending by mass and an attached
/// [`PeakIndex`] for tolerance-window queries.
pub struct Spectrum {
    pub path: String,
    peaks: Vec<Peak>,
    index: PeakIndex,
    /// Rows dropped during load because they could not be parsed.
    pub skipped_rows: usize,
}

impl Spectrum {
    /// Build a spectrum from raw peaks; they are sorted and indexed here.
    pub fn new(path: impl Into<String>, mut peaks: Vec<Peak>) -> Self {
        peaks.sort_by(|a, b| a.mass.total_cmp(&b.mass));
        let index = PeakIndex::build(&peaks);
        Self {
            path: path.into(),
            peaks,
            index,
            skipped_rows: 0,
        }
    }

    /// Load an ASC file: tab-separated `mass`, `intensity`, optional third
    /// error column (ignored). Blank and `#` lines are skipped; if the
    /// first remaining row's first field is not a float it is treated as a
    /// header and dropped. Unparseable rows are skipped and counted.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| MimiError::io(path.display().to_string(), e))?;
        let reader = BufReader::new(file);

        let mut peaks = Vec::new();
        let mut skipped = 0usize;
        let mut first_data_line = true;
        for line in reader.lines() {
            let line = line.map_err(|e| MimiError::io(path.display().to_string(), e))?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            if first_data_line {
                first_data_line = false;
                if fields[0].parse::<f64>().is_err() {
                    continue;
                }
            }
            if fields.len() < 2 {
                skipped += 1;
                continue;
            }
            match (fields[0].parse::<f64>(), fields[1].parse::<f64>()) {
                (Ok(mass), Ok(intensity)) if mass.is_finite() && mass >= 0.0 => {
                    peaks.push(Peak { mass, intensity });
                }
                _ => skipped += 1,
            }
        }
        let mut spectrum = Self::new(path.display().to_string(), peaks);
        spectrum.skipped_rows = skipped;
        Ok(spectrum)
    }

    pub fn peaks(&self) -> &[Peak] {
        &self.peaks
    }

    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    /// Indices of all peaks with `|mass - query_mass| <= query_mass * ppm`,
    /// ascending. `ppm` is a unitless ratio (5 ppm = 5e-6).
    pub fn search(&self, query_mass: f64, ppm: f64) -> Vec<usize> {
        self.index.search(&self.peaks, query_mass, ppm)
    }
}

#[derive(Debug, Default)]
/// Sparse mapping from `floor(mass)` to the half-open range of peak
/// indices in that 1 Da bin. Peak density per Dalton is bounded in the
/// spectra of interest, so a query touches O(1) bins.
pub struct PeakIndex {
    bins: Vec<Option<(usize, usize)>>,
}

impl PeakIndex {
    /// Build over peaks already sorted ascending by mass.
    pub fn build(peaks: &[Peak]) -> Self {
        let Some(last) = peaks.last() else {
            return Self::default();
        };
        let mut bins = vec![None; last.mass.floor() as usize + 1];
        for (i, peak) in peaks.iter().enumerate() {
            let entry = &mut bins[peak.mass.floor() as usize];
            match entry {
                None => *entry = Some((i, i + 1)),
                Some((_, end)) => *end = i + 1,
            }
        }
        Self { bins }
    }

    /// See [`Spectrum::search`]. Probes the bins around `floor(query_mass)`
    /// and expands outward over empty bins before the linear scan.
    pub fn search(&self, peaks: &[Peak], query_mass: f64, ppm: f64) -> Vec<usize> {
        if self.bins.is_empty() {
            return Vec::new();
        }
        let eps = query_mass * ppm;
        let center = query_mass.floor() as i64;

        let mut start = 0usize;
        let mut bin = (center - 1).min(self.bins.len() as i64 - 1);
        while bin >= 0 {
            if let Some((bin_start, _)) = self.bins[bin as usize] {
                start = bin_start;
                break;
            }
            bin -= 1;
        }

        let mut end = peaks.len();
        let mut bin = (center + 1).max(0);
        while (bin as usize) < self.bins.len() {
            if let Some((_, bin_end)) = self.bins[bin as usize] {
                end = bin_end;
                break;
            }
            bin += 1;
        }

        let mut hits = Vec::new();
        for i in start..end {
            if (peaks[i].mass - query_mass).abs() <= eps {
                hits.push(i);
            }
        }
        hits
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    fn spectrum(masses: &[(f64, f64)]) -> Spectrum {
        Spectrum::new(
            "test",
            masses
                .iter()
                .map(|&(mass, intensity)| Peak { mass, intensity })
                .collect(),
        )
    }

    #[test]
    fn test_search_window() {
        let s = spectrum(&[(100.0000, 1.0), (100.0005, 2.0), (200.0000, 3.0)]);
        assert_eq!(s.search(100.0000, 10e-6), vec![0, 1]);
        assert_eq!(s.search(150.0, 10e-6), Vec::<usize>::new());
        assert_eq!(s.search(200.0, 5e-6), vec![2]);
    }

    #[test]
    fn test_search_is_exact() {
        let s = spectrum(&[
            (99.9990, 1.0),
            (100.0000, 1.0),
            (100.0005, 1.0),
            (100.0020, 1.0),
            (101.0000, 1.0),
        ]);
        let ppm = 10e-6; // eps = 0.001 at m/z 100
        let hits = s.search(100.0000, ppm);
        assert_eq!(hits, vec![0, 1, 2]);
        for (i, peak) in s.peaks().iter().enumerate() {
            let expected = (peak.mass - 100.0).abs() <= 100.0 * ppm;
            assert_eq!(hits.contains(&i), expected, "peak {i}");
        }
    }

    #[test]
    fn test_query_beyond_edges() {
        let s = spectrum(&[(100.0, 1.0), (200.0, 2.0)]);
        assert!(s.search(500.0, 10e-6).is_empty());
        assert!(s.search(0.5, 10e-6).is_empty());
    }

    #[test]
    fn test_empty_spectrum() {
        let s = spectrum(&[]);
        assert!(s.search(100.0, 10e-6).is_empty());
    }

    #[test]
    fn test_sorted_after_construction() {
        let s = spectrum(&[(200.0, 1.0), (100.0, 2.0), (150.0, 3.0)]);
        let masses: Vec<f64> = s.peaks().iter().map(|p| p.mass).collect();
        assert_eq!(masses, vec![100.0, 150.0, 200.0]);
    }

    #[test]
    fn test_load_asc() {
        let path = std::env::temp_dir().join("mimi_test_sample.asc");
        let mut file = File::create(&path).unwrap();
        write!(
            file,
            "# instrument export\nmass\tintensity\terror\n200.1\t5e4\t0.1\n\n100.2\t1e6\t0.0\nbroken\trow\n150.0\n"
        )
        .unwrap();
        drop(file);
        let s = Spectrum::load(&path).unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!(s.peaks()[0].mass, 100.2);
        assert_eq!(s.peaks()[1].mass, 200.1);
        assert_eq!(s.skipped_rows, 2);
    }

    #[test]
    fn test_load_asc_without_header() {
        let path = std::env::temp_dir().join("mimi_test_sample_noheader.asc");
        std::fs::write(&path, "100.5\t2e5\t0.0\n101.5\t3e5\t0.0\n").unwrap();
        let s = Spectrum::load(&path).unwrap();
        assert_eq!(s.len(), 2);
    }
}
