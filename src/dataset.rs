//! Reading categorical datasets from delimited text.

use crate::{Error, Result};
use csv_core::{ReadFieldResult, ReaderBuilder};
use std::io;

/// Which header lines precede the data rows, as a bitmask: `1` a line of
/// variable names, `2` a line of cardinalities, `4` a single combined
/// `name_cardinality` line. Without a cardinality header, cardinalities are
/// inferred from the data (at least 2 per variable).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeaderFlags(pub u8);

impl HeaderFlags {
    /// First line holds variable names.
    pub const NAMES: u8 = 1;
    /// A line holds the variable cardinalities.
    pub const CARDINALITIES: u8 = 2;
    /// A single line holds `name_cardinality` fields.
    pub const NAME_CARD: u8 = 4;

    fn has(self, flag: u8) -> bool {
        self.0 & flag != 0
    }
}

/// A categorical dataset: integer value rows plus per-column cardinalities,
/// and variable names when the file declared them.
pub struct Dataset {
    names: Option<Vec<String>>,
    card: Vec<usize>,
    rows: Vec<Vec<usize>>,
}

impl Dataset {
    /// Variable names from the header, if any.
    pub fn names(&self) -> Option<&[String]> {
        self.names.as_deref()
    }

    /// Cardinality of each column.
    pub fn cardinalities(&self) -> &[usize] {
        &self.card
    }

    /// The data rows; every value is below its column's cardinality.
    pub fn rows(&self) -> &[Vec<usize>] {
        &self.rows
    }

    /// Number of columns.
    pub fn num_columns(&self) -> usize {
        self.card.len()
    }

    /// Reads a delimited file.
    ///
    /// Values are integer category indices; header lines per `header`. Fails
    /// with [`Error::InvalidData`] on ragged records, non-numeric values, or
    /// values at or above a declared cardinality.
    pub fn read<I: io::Read>(input: I, delimiter: u8, header: HeaderFlags) -> Result<Dataset> {
        let mut records = read_records(input, delimiter)?.into_iter();

        let mut names = None;
        let mut declared: Option<Vec<usize>> = None;
        if header.has(HeaderFlags::NAME_CARD) {
            let line = records
                .next()
                .ok_or_else(|| Error::InvalidData("missing name_cardinality header".into()))?;
            let mut split_names = Vec::with_capacity(line.len());
            let mut split_cards = Vec::with_capacity(line.len());
            for field in &line {
                let (name, card) = field.rsplit_once('_').ok_or_else(|| {
                    Error::InvalidData(format!("header field {field:?} is not name_cardinality"))
                })?;
                split_names.push(name.to_string());
                split_cards.push(parse_card(card)?);
            }
            names = Some(split_names);
            declared = Some(split_cards);
        } else {
            if header.has(HeaderFlags::NAMES) {
                let line = records
                    .next()
                    .ok_or_else(|| Error::InvalidData("missing names header".into()))?;
                names = Some(line);
            }
            if header.has(HeaderFlags::CARDINALITIES) {
                let line = records
                    .next()
                    .ok_or_else(|| Error::InvalidData("missing cardinalities header".into()))?;
                declared = Some(line.iter().map(|f| parse_card(f)).collect::<Result<_>>()?);
            }
        }

        let mut rows = Vec::new();
        for (r, record) in records.enumerate() {
            let row: Vec<usize> = record
                .iter()
                .map(|field| {
                    field.parse().map_err(|_| {
                        Error::InvalidData(format!("row {r}: value {field:?} is not an integer"))
                    })
                })
                .collect::<Result<_>>()?;
            rows.push(row);
        }
        if rows.is_empty() {
            return Err(Error::InvalidData("dataset has no rows".into()));
        }
        let columns = rows[0].len();
        for (r, row) in rows.iter().enumerate() {
            if row.len() != columns {
                return Err(Error::InvalidData(format!(
                    "row {r} has {} fields, expected {columns}",
                    row.len()
                )));
            }
        }

        let card = match declared {
            Some(card) => {
                if card.len() != columns {
                    return Err(Error::InvalidData(format!(
                        "{} cardinalities declared for {columns} columns",
                        card.len()
                    )));
                }
                card
            }
            None => {
                let mut card = vec![2; columns];
                for row in &rows {
                    for (c, &value) in row.iter().enumerate() {
                        card[c] = card[c].max(value + 1);
                    }
                }
                card
            }
        };
        for (r, row) in rows.iter().enumerate() {
            for (c, &value) in row.iter().enumerate() {
                if value >= card[c] {
                    return Err(Error::InvalidData(format!(
                        "row {r}: value {value} out of range for column {c} (cardinality {})",
                        card[c]
                    )));
                }
            }
        }

        Ok(Dataset { names, card, rows })
    }
}

fn parse_card(field: &str) -> Result<usize> {
    let card: usize = field
        .parse()
        .map_err(|_| Error::InvalidData(format!("bad cardinality {field:?}")))?;
    if card < 2 {
        return Err(Error::InvalidData(format!(
            "cardinality {card} is below 2"
        )));
    }
    Ok(card)
}

/// Streams delimited records out of `input` with a reusable field buffer.
/// Blank records are dropped.
fn read_records<I: io::Read>(mut input: I, delimiter: u8) -> Result<Vec<Vec<String>>> {
    let mut inputbuf = [0; 16384];
    let mut fieldbuf = [0; 1024];
    let mut fieldlen = 0;
    let mut record = Vec::new();
    let mut records = Vec::new();
    let mut reader = ReaderBuilder::new().delimiter(delimiter).build();

    loop {
        let read = input.read(&mut inputbuf)?;
        let mut bytes = &inputbuf[..read];
        loop {
            let (result, nin, nout) = reader.read_field(bytes, &mut fieldbuf[fieldlen..]);
            bytes = &bytes[nin..];
            fieldlen += nout;
            match result {
                ReadFieldResult::InputEmpty => break,
                ReadFieldResult::OutputFull => {
                    return Err(Error::InvalidData(format!(
                        "field too long on line {}",
                        reader.line()
                    )));
                }
                ReadFieldResult::Field { record_end } => {
                    let field = std::str::from_utf8(&fieldbuf[..fieldlen])
                        .map_err(|e| Error::InvalidData(e.to_string()))?;
                    record.push(field.trim().to_string());
                    fieldlen = 0;
                    if record_end {
                        if record.iter().any(|f| !f.is_empty()) {
                            records.push(std::mem::take(&mut record));
                        } else {
                            record.clear();
                        }
                    }
                }
                ReadFieldResult::End => {
                    if record.iter().any(|f| !f.is_empty()) {
                        records.push(std::mem::take(&mut record));
                    }
                    return Ok(records);
                }
            }
        }
    }
}
