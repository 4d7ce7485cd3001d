//! Readers turning unknown-peak text in the supported formats into [`Peak`]s.

use std::fmt::{Display, Formatter};
use std::path::Path;
use std::str::FromStr;

use minecore::annotation::ranking::KnownPeak;
use minecore::data::adduct::Polarity;
use minecore::data::peak::Peak;
use minecore::data::spectrum::MzSpectrum;
use minecore::error::MineError;
use roxmltree::{Document, Node};
use tracing::debug;

use crate::error::{DbError, Result};

/// Text format of an unknown-peak input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeakSourceFormat {
    Form,
    Mgf,
    Msp,
    MzXml,
}

impl FromStr for PeakSourceFormat {
    type Err = MineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "form" | "txt" => Ok(PeakSourceFormat::Form),
            "mgf" => Ok(PeakSourceFormat::Mgf),
            "msp" => Ok(PeakSourceFormat::Msp),
            "mzxml" => Ok(PeakSourceFormat::MzXml),
            _ => Err(MineError::UnsupportedFormat { format: s.to_string() }),
        }
    }
}

impl Display for PeakSourceFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PeakSourceFormat::Form => "form",
            PeakSourceFormat::Mgf => "mgf",
            PeakSourceFormat::Msp => "msp",
            PeakSourceFormat::MzXml => "mzXML",
        };
        write!(f, "{name}")
    }
}

impl PeakSourceFormat {
    /// Format implied by a file extension.
    pub fn from_path(path: &Path) -> Result<Self, MineError> {
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        extension.parse()
    }
}

/// Unknown-peak text in one of the supported formats.
///
/// `polarity` applies to every peak unless the format carries its own
/// polarity per record.
#[derive(Clone, Debug, PartialEq)]
pub enum PeakSource {
    /// Free-form input: one m/z per line, or for MS2 a precursor m/z line followed
    /// by `mz intensity` fragment lines.
    Form { text: String, polarity: Polarity, ms2: bool },
    Mgf { text: String, polarity: Polarity },
    Msp { text: String, polarity: Polarity },
    MzXml { text: String, polarity: Polarity },
}

impl PeakSource {
    pub fn new(format: PeakSourceFormat, text: String, polarity: Polarity, ms2: bool) -> Self {
        match format {
            PeakSourceFormat::Form => PeakSource::Form { text, polarity, ms2 },
            PeakSourceFormat::Mgf => PeakSource::Mgf { text, polarity },
            PeakSourceFormat::Msp => PeakSource::Msp { text, polarity },
            PeakSourceFormat::MzXml => PeakSource::MzXml { text, polarity },
        }
    }

    pub fn format(&self) -> PeakSourceFormat {
        match self {
            PeakSource::Form { .. } => PeakSourceFormat::Form,
            PeakSource::Mgf { .. } => PeakSourceFormat::Mgf,
            PeakSource::Msp { .. } => PeakSourceFormat::Msp,
            PeakSource::MzXml { .. } => PeakSourceFormat::MzXml,
        }
    }

    pub fn parse(&self) -> Result<Vec<Peak>> {
        let peaks = match self {
            PeakSource::Form { text, polarity, ms2: false } => parse_form_ms1(text, *polarity),
            PeakSource::Form { text, polarity, ms2: true } => parse_form_ms2(text, *polarity),
            PeakSource::Mgf { text, polarity } => parse_mgf(text, *polarity),
            PeakSource::Msp { text, polarity } => parse_msp(text, *polarity),
            PeakSource::MzXml { text, polarity } => parse_mzxml(text, *polarity),
        }?;
        debug!(format = %self.format(), peaks = peaks.len(), "parsed peaks");
        Ok(peaks)
    }
}

fn parse_error(format: &'static str, line: usize, message: impl Into<String>) -> DbError {
    DbError::Parse { format, line, message: message.into() }
}

fn parse_number(format: &'static str, line: usize, token: &str) -> Result<f64> {
    token
        .trim()
        .parse::<f64>()
        .map_err(|_| parse_error(format, line, format!("expected a number, found {token:?}")))
}

/// Parses an `mz intensity` line separated by whitespace.
fn parse_fragment(format: &'static str, line: usize, text: &str) -> Result<(f64, f64)> {
    let mut tokens = text.split_whitespace();
    match (tokens.next(), tokens.next(), tokens.next()) {
        (Some(mz), Some(intensity), None) => Ok((
            parse_number(format, line, mz)?,
            parse_number(format, line, intensity)?,
        )),
        _ => Err(parse_error(format, line, format!("expected `mz intensity`, found {text:?}"))),
    }
}

fn parse_form_ms1(text: &str, polarity: Polarity) -> Result<Vec<Peak>> {
    let mut peaks = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mz = parse_number("form", i + 1, line)?;
        peaks.push(Peak::new(line, 0.0, mz, polarity));
    }
    Ok(peaks)
}

fn parse_form_ms2(text: &str, polarity: Polarity) -> Result<Vec<Peak>> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty());

    let Some((line_no, precursor)) = lines.next() else {
        return Ok(Vec::new());
    };
    let name = precursor.split_whitespace().next().unwrap_or(precursor);
    let mz = parse_number("form", line_no, name)?;

    let fragments = lines
        .map(|(line_no, line)| parse_fragment("form", line_no, line))
        .collect::<Result<Vec<_>>>()?;

    Ok(vec![Peak::new(name, 0.0, mz, polarity).with_fragment_spectrum(MzSpectrum::from_pairs(fragments))])
}

/// Polarity from an MGF charge such as `2+` or `1-`.
fn charge_polarity(charge: &str) -> Option<Polarity> {
    let charge = charge.trim();
    if charge.ends_with('+') || charge.starts_with('+') {
        Some(Polarity::Positive)
    } else if charge.ends_with('-') || charge.starts_with('-') {
        Some(Polarity::Negative)
    } else {
        None
    }
}

#[derive(Default)]
struct RecordBuilder {
    name: Option<String>,
    precursor: Option<(String, f64)>,
    retention_time: f64,
    polarity: Option<Polarity>,
    fragments: Vec<(f64, f64)>,
}

impl RecordBuilder {
    fn build(self, format: &'static str, line: usize, default: Polarity) -> Result<Peak> {
        let (mz_text, mz) = self
            .precursor
            .ok_or_else(|| parse_error(format, line, "record without precursor m/z"))?;
        let name = self.name.unwrap_or(mz_text);
        let mut peak = Peak::new(name, self.retention_time, mz, self.polarity.unwrap_or(default));
        if !self.fragments.is_empty() {
            peak.fragment_spectrum = Some(MzSpectrum::from_pairs(self.fragments));
        }
        Ok(peak)
    }
}

fn parse_mgf(text: &str, polarity: Polarity) -> Result<Vec<Peak>> {
    let mut peaks = Vec::new();
    let mut record: Option<RecordBuilder> = None;

    for (i, raw) in text.lines().enumerate() {
        let line_no = i + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line.eq_ignore_ascii_case("BEGIN IONS") {
            record = Some(RecordBuilder::default());
            continue;
        }
        if line.eq_ignore_ascii_case("END IONS") {
            let builder = record
                .take()
                .ok_or_else(|| parse_error("MGF", line_no, "END IONS without BEGIN IONS"))?;
            peaks.push(builder.build("MGF", line_no, polarity)?);
            continue;
        }
        let Some(builder) = record.as_mut() else {
            // global parameters before the first block
            continue;
        };
        match line.split_once('=') {
            Some((key, value)) => match key.trim().to_ascii_uppercase().as_str() {
                "TITLE" => builder.name = Some(value.trim().to_string()),
                "PEPMASS" => {
                    let mz_text = value.split_whitespace().next().unwrap_or_default();
                    builder.precursor = Some((mz_text.to_string(), parse_number("MGF", line_no, mz_text)?));
                }
                "RTINSECONDS" => builder.retention_time = parse_number("MGF", line_no, value)?,
                "CHARGE" => {
                    if let Some(p) = charge_polarity(value) {
                        builder.polarity = Some(p);
                    }
                }
                _ => {}
            },
            None => builder.fragments.push(parse_fragment("MGF", line_no, line)?),
        }
    }

    if record.is_some() {
        return Err(parse_error("MGF", text.lines().count(), "unterminated BEGIN IONS block"));
    }
    Ok(peaks)
}

fn parse_msp(text: &str, polarity: Polarity) -> Result<Vec<Peak>> {
    let mut peaks = Vec::new();
    let mut record: Option<RecordBuilder> = None;
    let mut in_peaks = false;
    let mut last_line = 0;

    for (i, raw) in text.lines().enumerate() {
        let line_no = i + 1;
        last_line = line_no;
        let line = raw.trim();
        if line.is_empty() {
            if let Some(builder) = record.take() {
                peaks.push(builder.build("MSP", line_no, polarity)?);
            }
            in_peaks = false;
            continue;
        }
        let builder = record.get_or_insert_with(RecordBuilder::default);

        if in_peaks {
            builder.fragments.push(parse_fragment("MSP", line_no, line)?);
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            return Err(parse_error("MSP", line_no, format!("expected `KEY: value`, found {line:?}")));
        };
        let value = value.trim();
        match key.trim().to_ascii_uppercase().as_str() {
            "NAME" => builder.name = Some(value.to_string()),
            "PRECURSORMZ" => builder.precursor = Some((value.to_string(), parse_number("MSP", line_no, value)?)),
            "RETENTIONTIME" => builder.retention_time = parse_number("MSP", line_no, value)?,
            "IONMODE" => builder.polarity = Some(value.parse::<Polarity>()?),
            "NUM PEAKS" => in_peaks = true,
            _ => {}
        }
    }

    if let Some(builder) = record {
        peaks.push(builder.build("MSP", last_line, polarity)?);
    }
    Ok(peaks)
}

fn child_text<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.children()
        .find(|c| c.is_element() && c.tag_name().name() == name)
        .and_then(|c| c.text())
}

/// Seconds from an xs:duration such as `PT2999.05S`.
fn parse_retention_time(value: &str) -> Option<f64> {
    value.trim().strip_prefix("PT")?.strip_suffix('S')?.parse().ok()
}

fn parse_mzxml(text: &str, polarity: Polarity) -> Result<Vec<Peak>> {
    let document = Document::parse(text)?;
    let mut peaks = Vec::new();

    for scan in document
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "scan")
        .filter(|n| n.attribute("msLevel") == Some("2"))
    {
        let line = document.text_pos_at(scan.range().start).row as usize;
        let mz_text = child_text(scan, "precursorMz")
            .map(str::trim)
            .ok_or_else(|| parse_error("mzXML", line, "MS2 scan without precursorMz"))?;
        let mz = parse_number("mzXML", line, mz_text)?;

        let rt_text = scan.attribute("retentionTime").unwrap_or("PT0S");
        let retention_time = parse_retention_time(rt_text)
            .ok_or_else(|| parse_error("mzXML", line, format!("invalid retentionTime {rt_text:?}")))?;

        let scan_polarity = match scan.attribute("polarity") {
            Some(token) => token.parse::<Polarity>()?,
            None => polarity,
        };
        peaks.push(Peak::new(format!("{mz_text} @ {retention_time}"), retention_time, mz, scan_polarity));
    }
    Ok(peaks)
}

/// Parses a known-peaks table, comma or tab separated.
///
/// Each row is `name, retention time, m/z, polarity`, optionally followed by the
/// `formula, adduct, compound id` that identify the peak. A leading header row is
/// skipped, as are blank lines and `#` comments.
pub fn parse_known_peaks(text: &str) -> Result<Vec<KnownPeak>> {
    const FORMAT: &str = "known peaks";
    let mut known = Vec::new();
    let mut first_row = true;

    for (i, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let delimiter = if line.contains('\t') { '\t' } else { ',' };
        let fields: Vec<&str> = line.split(delimiter).map(str::trim).collect();
        if std::mem::take(&mut first_row) && fields.get(2).is_some_and(|mz| mz.parse::<f64>().is_err()) {
            continue;
        }
        if fields.len() != 4 && fields.len() != 7 {
            return Err(parse_error(FORMAT, i + 1, format!("expected 4 or 7 fields, found {}", fields.len())));
        }

        let retention_time = parse_number(FORMAT, i + 1, fields[1])?;
        let mz = parse_number(FORMAT, i + 1, fields[2])?;
        let polarity = fields[3]
            .parse::<Polarity>()
            .map_err(|e| parse_error(FORMAT, i + 1, e.to_string()))?;
        let mut peak = Peak::new(fields[0], retention_time, mz, polarity);

        let compound_id = match fields[..] {
            [_, _, _, _, formula, adduct, id] => {
                peak.add_formula(adduct, formula);
                (!id.is_empty()).then(|| id.to_string())
            }
            _ => None,
        };
        known.push(KnownPeak { peak, compound_id });
    }
    debug!(peaks = known.len(), "parsed known peaks");
    Ok(known)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MGF: &str = "BEGIN IONS\nTITLE=Ion 1\nSCANS=7906\nRTINSECONDS=2999.0465\n\
                       CHARGE=2+\nPEPMASS=188.3805\n80.1044 2.6\n81.3382 6.8\n\
                       143.0018 19.6\nEND IONS\n\nBEGIN IONS\nTITLE=Ion 2\n\
                       SCANS=7908\nRTINSECONDS=2999.8819\nCHARGE=2-\n\
                       PEPMASS=95.95\n67.9357 3.7\nEND IONS\n\n";

    const MSP: &str = "NAME: test\nPRECURSORMZ: 153.0195\nPRECURSORTYPE: [M-H]-\n\
                       RETENTIONTIME: 9.461333\nIONMODE: Negative\nNum Peaks: 5\n\
                       82.1518\t1000\n106.939\t7500\n109.0055\t11000000\n\
                       109.8953\t12000\n153.1177\t12000\n\n";

    const MZXML: &str = r#"<?xml version="1.0" encoding="ISO-8859-1"?>
<mzXML xmlns="http://sashimi.sourceforge.net/schema_revision/mzXML_3.2">
  <msRun scanCount="3">
    <scan num="1" msLevel="1" polarity="+" retentionTime="PT10.5S">
      <scan num="2" msLevel="2" polarity="-" retentionTime="PT11.25S">
        <precursorMz precursorIntensity="1200">181.0707</precursorMz>
      </scan>
    </scan>
    <scan num="3" msLevel="2" retentionTime="PT12S">
      <precursorMz>203.0526</precursorMz>
    </scan>
  </msRun>
</mzXML>"#;

    #[test]
    fn test_known_peaks() {
        let text = "name,rt,mz,charge,formula,adduct,id\n\
                    glucose,11.2,181.0707,+,C6H12O6,[M+H]+,glc\n\
                    unknown 2\t12.0\t203.0526\tPositive\n";
        let known = parse_known_peaks(text).unwrap();
        assert_eq!(known.len(), 2);
        assert_eq!(known[0].compound_id.as_deref(), Some("glc"));
        assert!(known[0].peak.formulas["[M+H]+"].contains("C6H12O6"));
        assert_eq!(known[0].peak.retention_time, 11.2);
        assert_eq!(known[1].peak.name, "unknown 2");
        assert!(known[1].compound_id.is_none());
        assert!(known[1].peak.formulas.is_empty());
    }

    #[test]
    fn test_known_peaks_field_count() {
        let err = parse_known_peaks("a,1.0,181.07,+,C6H12O6\n").unwrap_err();
        assert!(matches!(err, DbError::Parse { line: 1, .. }));
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("MGF".parse::<PeakSourceFormat>().unwrap(), PeakSourceFormat::Mgf);
        assert_eq!("mzXML".parse::<PeakSourceFormat>().unwrap(), PeakSourceFormat::MzXml);
        assert!(matches!(
            "xlsx".parse::<PeakSourceFormat>(),
            Err(MineError::UnsupportedFormat { .. })
        ));
        assert_eq!(PeakSourceFormat::from_path(Path::new("run.msp")).unwrap(), PeakSourceFormat::Msp);
    }

    #[test]
    fn test_form_ms1() {
        let source = PeakSource::Form { text: "181.0707\n\n203.0526\n".into(), polarity: Polarity::Positive, ms2: false };
        let peaks = source.parse().unwrap();
        assert_eq!(peaks.len(), 2);
        assert_eq!(peaks[0].name, "181.0707");
        assert_eq!(peaks[1].mz, 203.0526);
        assert!(peaks[0].fragment_spectrum.is_none());
    }

    #[test]
    fn test_form_ms2() {
        let text = "181.0707\n163.06 100\n85.03 50\n".to_string();
        let peaks = PeakSource::Form { text, polarity: Polarity::Negative, ms2: true }.parse().unwrap();
        assert_eq!(peaks.len(), 1);
        let spectrum = peaks[0].fragment_spectrum.as_ref().unwrap();
        assert_eq!(spectrum.mz, vec![85.03, 163.06]);
        assert_eq!(peaks[0].polarity, Polarity::Negative);
    }

    #[test]
    fn test_form_rejects_text() {
        let source = PeakSource::Form { text: "181.07\nabc\n".into(), polarity: Polarity::Positive, ms2: false };
        assert!(matches!(source.parse(), Err(DbError::Parse { line: 2, .. })));
    }

    #[test]
    fn test_mgf() {
        let peaks = PeakSource::Mgf { text: MGF.into(), polarity: Polarity::Positive }.parse().unwrap();
        assert_eq!(peaks.len(), 2);
        assert_eq!(peaks[0].name, "Ion 1");
        assert_eq!(peaks[0].mz, 188.3805);
        assert_eq!(peaks[0].retention_time, 2999.0465);
        assert_eq!(peaks[0].fragment_spectrum.as_ref().unwrap().len(), 3);
        assert_eq!(peaks[0].polarity, Polarity::Positive);
        assert_eq!(peaks[1].polarity, Polarity::Negative);
    }

    #[test]
    fn test_msp() {
        let peaks = PeakSource::Msp { text: MSP.into(), polarity: Polarity::Positive }.parse().unwrap();
        assert_eq!(peaks.len(), 1);
        assert_eq!(peaks[0].name, "test");
        assert_eq!(peaks[0].mz, 153.0195);
        assert_eq!(peaks[0].polarity, Polarity::Negative);
        assert_eq!(peaks[0].fragment_spectrum.as_ref().unwrap().len(), 5);
    }

    #[test]
    fn test_mzxml() {
        let peaks = PeakSource::MzXml { text: MZXML.into(), polarity: Polarity::Positive }.parse().unwrap();
        assert_eq!(peaks.len(), 2);
        assert_eq!(peaks[0].name, "181.0707 @ 11.25");
        assert_eq!(peaks[0].polarity, Polarity::Negative);
        assert_eq!(peaks[1].retention_time, 12.0);
        assert_eq!(peaks[1].polarity, Polarity::Positive);
    }

    #[test]
    fn test_mzxml_malformed() {
        let source = PeakSource::MzXml { text: "<mzXML><scan".into(), polarity: Polarity::Positive };
        assert!(matches!(source.parse(), Err(DbError::Xml(_))));
    }
}
