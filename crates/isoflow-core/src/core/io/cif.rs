//! Cell-length extraction from CIF text and the replication needed to satisfy
//! the minimum-image convention for a given interaction cutoff.

use nalgebra::Vector3;
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

static CELL_LENGTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*_cell_length_([abc])\s+([-+]?\d*\.?\d+(?:[eE][-+]?\d+)?)")
        .expect("cell length pattern is valid")
});

#[derive(Debug, Error, PartialEq)]
pub enum CifError {
    #[error("CIF is missing the '_cell_length_{axis}' entry")]
    MissingCellLength { axis: char },
    #[error("CIF cell length '_cell_length_{axis}' must be positive, found {value}")]
    InvalidCellLength { axis: char, value: f64 },
}

/// Reads `_cell_length_a/b/c` in Ångström. Uncertainties in parentheses
/// (`12.345(6)`) are ignored.
pub fn cell_lengths(text: &str) -> Result<Vector3<f64>, CifError> {
    let mut lengths: [Option<f64>; 3] = [None; 3];
    for caps in CELL_LENGTH.captures_iter(text) {
        let slot = match &caps[1] {
            "a" => 0,
            "b" => 1,
            _ => 2,
        };
        if lengths[slot].is_none() {
            lengths[slot] = caps[2].parse::<f64>().ok();
        }
    }
    let mut cell = Vector3::zeros();
    for (i, axis) in ['a', 'b', 'c'].into_iter().enumerate() {
        let value = lengths[i].ok_or(CifError::MissingCellLength { axis })?;
        if value <= 0.0 {
            return Err(CifError::InvalidCellLength { axis, value });
        }
        cell[i] = value;
    }
    Ok(cell)
}

/// Smallest replication along each axis such that every replicated length
/// spans at least twice the cutoff.
pub fn minimal_unit_cells(lengths: &Vector3<f64>, cutoff: f64) -> [i64; 3] {
    let cells = lengths.map(|length| ((2.0 * cutoff) / length).ceil().max(1.0));
    [cells.x as i64, cells.y as i64, cells.z as i64]
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIL47: &str = "data_MIL-47\n\
        _symmetry_space_group_name_H-M 'P 1'\n\
        _cell_length_a    6.8179(2)\n\
        _cell_length_b   16.1430\n\
        _cell_length_c   13.9390\n\
        _cell_angle_alpha 90.0\n";

    #[test]
    fn reads_lengths_and_ignores_uncertainty() {
        let cell = cell_lengths(MIL47).unwrap();
        assert_eq!(cell, Vector3::new(6.8179, 16.1430, 13.9390));
    }

    #[test]
    fn missing_axis_is_named() {
        let text = "_cell_length_a 10\n_cell_length_c 10\n";
        assert_eq!(
            cell_lengths(text).unwrap_err(),
            CifError::MissingCellLength { axis: 'b' }
        );
    }

    #[test]
    fn unit_cells_cover_twice_the_cutoff() {
        let cell = cell_lengths(MIL47).unwrap();
        assert_eq!(minimal_unit_cells(&cell, 12.0), [4, 2, 2]);
        assert_eq!(minimal_unit_cells(&Vector3::new(30.0, 30.0, 30.0), 12.0), [1, 1, 1]);
    }
}
