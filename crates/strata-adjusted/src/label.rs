//! Dictionary-encoded categorical arrays.
//!
//! A [`LabelArray`] stores one `u32` code per cell plus a dictionary mapping
//! codes to strings. Code [`MISSING_CODE`] is reserved for missing labels and
//! never appears in the dictionary. Predicates are evaluated once per
//! category and then broadcast over the codes, so their cost scales with the
//! number of distinct labels rather than the number of cells.

use crate::error::{ArrayError, Result};
use ndarray::{Array2, ArrayView2, Axis, s};
use std::collections::HashMap;
use std::fmt;

/// Code reserved for missing labels.
pub const MISSING_CODE: u32 = 0;

/// Categorical 2-D array.
#[derive(Clone)]
pub struct LabelArray {
    codes: Array2<u32>,
    /// `categories[i]` is the label for code `i + 1`.
    categories: Vec<String>,
    lookup: HashMap<String, u32>,
}

impl fmt::Debug for LabelArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LabelArray")
            .field("shape", &self.shape())
            .field("categories", &self.categories)
            .finish_non_exhaustive()
    }
}

impl LabelArray {
    /// Build from row-major optional labels.
    pub fn new<I, S>(shape: (usize, usize), labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = Option<S>>,
        S: AsRef<str>,
    {
        let mut out = Self::missing(shape);
        let mut count = 0usize;
        let ncols = shape.1.max(1);
        for (idx, label) in labels.into_iter().enumerate() {
            count += 1;
            if idx >= shape.0 * shape.1 {
                continue;
            }
            let code = out.intern(label.as_ref().map(AsRef::as_ref));
            out.codes[[idx / ncols, idx % ncols]] = code;
        }
        if count != shape.0 * shape.1 {
            return Err(ArrayError::ShapeMismatch {
                expected: shape,
                actual: (count, 1),
            });
        }
        Ok(out)
    }

    /// Build from an array of optional labels.
    pub fn from_labels(labels: &Array2<Option<String>>) -> Self {
        let mut out = Self::missing(labels.dim());
        for ((row, col), label) in labels.indexed_iter() {
            let code = out.intern(label.as_deref());
            out.codes[[row, col]] = code;
        }
        out
    }

    /// Build from codes and a dictionary, validating every code.
    pub fn from_codes(codes: Array2<u32>, categories: Vec<String>) -> Result<Self> {
        let len = categories.len() + 1;
        if let Some(&code) = codes.iter().find(|&&c| c as usize >= len) {
            return Err(ArrayError::InvalidCategoryCode { code, len });
        }
        Ok(Self::from_parts(codes, categories))
    }

    pub(crate) fn from_parts(codes: Array2<u32>, categories: Vec<String>) -> Self {
        let lookup = categories
            .iter()
            .enumerate()
            .map(|(idx, label)| (label.clone(), idx as u32 + 1))
            .collect();
        Self {
            codes,
            categories,
            lookup,
        }
    }

    /// All-missing array.
    pub fn missing(shape: (usize, usize)) -> Self {
        Self {
            codes: Array2::from_elem(shape, MISSING_CODE),
            categories: Vec::new(),
            lookup: HashMap::new(),
        }
    }

    /// (rows, columns).
    pub fn shape(&self) -> (usize, usize) {
        self.codes.dim()
    }

    /// Code buffer.
    pub const fn codes(&self) -> &Array2<u32> {
        &self.codes
    }

    pub(crate) const fn codes_mut(&mut self) -> &mut Array2<u32> {
        &mut self.codes
    }

    /// Dictionary, indexed by `code - 1`.
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Borrowed view over the whole array.
    pub fn view(&self) -> LabelView<'_> {
        LabelView {
            codes: self.codes.view(),
            categories: &self.categories,
        }
    }

    /// Label for a code.
    pub fn category(&self, code: u32) -> Option<&str> {
        decode(&self.categories, code)
    }

    /// Label at a cell.
    pub fn get(&self, row: usize, col: usize) -> Option<&str> {
        self.codes
            .get([row, col])
            .and_then(|&code| self.category(code))
    }

    /// Code assigned to a label, if present in the dictionary.
    pub fn code_of(&self, label: &str) -> Option<u32> {
        self.lookup.get(label).copied()
    }

    /// Code for a label, extending the dictionary when needed.
    pub fn intern(&mut self, label: Option<&str>) -> u32 {
        let Some(label) = label else {
            return MISSING_CODE;
        };
        if let Some(&code) = self.lookup.get(label) {
            return code;
        }
        self.categories.push(label.to_string());
        let code = self.categories.len() as u32;
        self.lookup.insert(label.to_string(), code);
        code
    }

    /// Overwrite one cell.
    pub fn set(&mut self, row: usize, col: usize, label: Option<&str>) {
        let code = self.intern(label);
        self.codes[[row, col]] = code;
    }

    /// Overwrite an inclusive rectangular region with one label.
    pub fn fill_region(
        &mut self,
        rows: (usize, usize),
        cols: (usize, usize),
        label: Option<&str>,
    ) {
        let code = self.intern(label);
        self.codes
            .slice_mut(s![rows.0..=rows.1, cols.0..=cols.1])
            .fill(code);
    }

    /// Decode every cell.
    pub fn to_labels(&self) -> Array2<Option<String>> {
        self.codes
            .map(|&code| self.category(code).map(str::to_string))
    }

    /// True where the label is missing.
    pub fn is_missing(&self) -> Array2<bool> {
        self.codes.map(|&code| code == MISSING_CODE)
    }

    /// True where the label is present.
    pub fn not_missing(&self) -> Array2<bool> {
        self.codes.map(|&code| code != MISSING_CODE)
    }

    /// Evaluate `f` once per category and broadcast over the codes.
    ///
    /// Missing cells always evaluate to `false`.
    pub fn predicate<F>(&self, f: F) -> Array2<bool>
    where
        F: Fn(&str) -> bool,
    {
        let mut table = Vec::with_capacity(self.categories.len() + 1);
        table.push(false);
        table.extend(self.categories.iter().map(|label| f(label)));
        self.codes.map(|&code| table[code as usize])
    }

    /// Cells equal to `label`.
    pub fn eq_label(&self, label: &str) -> Array2<bool> {
        match self.code_of(label) {
            Some(code) => self.codes.map(|&c| c == code),
            None => Array2::from_elem(self.shape(), false),
        }
    }

    /// Present cells different from `label`.
    pub fn ne_label(&self, label: &str) -> Array2<bool> {
        self.predicate(|value| value != label)
    }

    /// Cells whose label is one of `choices`.
    pub fn is_in<S: AsRef<str>>(&self, choices: &[S]) -> Array2<bool> {
        self.predicate(|value| choices.iter().any(|c| c.as_ref() == value))
    }

    /// Cells whose label starts with `prefix`.
    pub fn starts_with(&self, prefix: &str) -> Array2<bool> {
        self.predicate(|value| value.starts_with(prefix))
    }

    /// Cells whose label ends with `suffix`.
    pub fn ends_with(&self, suffix: &str) -> Array2<bool> {
        self.predicate(|value| value.ends_with(suffix))
    }

    /// Cells whose label contains `needle`.
    pub fn contains(&self, needle: &str) -> Array2<bool> {
        self.predicate(|value| value.contains(needle))
    }

    /// Relabel through `f`; labels mapped to the same output share a code and
    /// `None` maps to missing.
    pub fn map_labels<F>(&self, f: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut out = Self::missing(self.shape());
        let mut table = Vec::with_capacity(self.categories.len() + 1);
        table.push(MISSING_CODE);
        for label in &self.categories {
            let mapped = f(label);
            table.push(out.intern(mapped.as_deref()));
        }
        out.codes = self.codes.map(|&code| table[code as usize]);
        out
    }

    /// Owned copy of rows `start..end`.
    pub fn slice_rows(&self, start: usize, end: usize) -> Self {
        self.view().slice_rows(start, end).to_array()
    }

    /// Owned copy of the selected columns.
    pub fn select_columns(&self, cols: &[usize]) -> Self {
        self.view().select_columns(cols)
    }

    /// Owned copy of the selected rows, in the given order.
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        Self::from_parts(self.codes.select(Axis(0), rows), self.categories.clone())
    }

    /// Stack arrays vertically, merging their dictionaries.
    pub fn concat_rows(parts: &[&Self]) -> Result<Self> {
        let Some(first) = parts.first() else {
            return Ok(Self::missing((0, 0)));
        };
        let ncols = first.shape().1;
        let mut out = Self::from_parts(Array2::from_elem((0, ncols), MISSING_CODE), Vec::new());
        let mut remapped = Vec::with_capacity(parts.len());
        for part in parts {
            if part.shape().1 != ncols {
                return Err(ArrayError::ShapeMismatch {
                    expected: (part.shape().0, ncols),
                    actual: part.shape(),
                });
            }
            let mut table = Vec::with_capacity(part.categories.len() + 1);
            table.push(MISSING_CODE);
            for label in &part.categories {
                table.push(out.intern(Some(label)));
            }
            remapped.push(part.codes.map(|&code| table[code as usize]));
        }
        let views: Vec<_> = remapped.iter().map(Array2::view).collect();
        out.codes = ndarray::concatenate(Axis(0), &views).map_err(|_| {
            ArrayError::ShapeMismatch {
                expected: (0, ncols),
                actual: (0, 0),
            }
        })?;
        Ok(out)
    }
}

impl PartialEq for LabelArray {
    fn eq(&self, other: &Self) -> bool {
        self.shape() == other.shape()
            && self
                .codes
                .iter()
                .zip(other.codes.iter())
                .all(|(&a, &b)| self.category(a) == other.category(b))
    }
}

/// Borrowed window over a [`LabelArray`].
#[derive(Debug, Clone, Copy)]
pub struct LabelView<'a> {
    codes: ArrayView2<'a, u32>,
    categories: &'a [String],
}

impl<'a> LabelView<'a> {
    /// (rows, columns).
    pub fn shape(&self) -> (usize, usize) {
        self.codes.dim()
    }

    /// Code buffer.
    pub const fn codes(&self) -> &ArrayView2<'a, u32> {
        &self.codes
    }

    /// Label at a cell.
    pub fn get(&self, row: usize, col: usize) -> Option<&'a str> {
        self.codes
            .get([row, col])
            .and_then(|&code| decode(self.categories, code))
    }

    /// Sub-view of rows `start..end`.
    pub fn slice_rows(&self, start: usize, end: usize) -> Self {
        Self {
            codes: self.codes.slice_move(s![start..end, ..]),
            categories: self.categories,
        }
    }

    /// Owned copy of the selected columns.
    pub fn select_columns(&self, cols: &[usize]) -> LabelArray {
        LabelArray::from_parts(
            self.codes.select(Axis(1), cols),
            self.categories.to_vec(),
        )
    }

    /// Owned copy.
    pub fn to_array(&self) -> LabelArray {
        LabelArray::from_parts(self.codes.to_owned(), self.categories.to_vec())
    }
}

fn decode(categories: &[String], code: u32) -> Option<&str> {
    if code == MISSING_CODE {
        return None;
    }
    categories.get(code as usize - 1).map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rstest::rstest;

    fn sectors() -> LabelArray {
        LabelArray::new(
            (2, 3),
            [
                Some("tech"),
                None,
                Some("energy"),
                Some("telecom"),
                Some("tech"),
                None,
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_encoding_reserves_missing_code() {
        let labels = sectors();
        assert_eq!(labels.categories(), &["tech", "energy", "telecom"]);
        assert_eq!(labels.codes(), &array![[1, 0, 2], [3, 1, 0]]);
        assert_eq!(labels.get(0, 1), None);
        assert_eq!(labels.get(1, 0), Some("telecom"));
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let err = LabelArray::new((2, 2), [Some("a"), Some("b")]).unwrap_err();
        assert!(matches!(err, ArrayError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_from_codes_validates() {
        let err = LabelArray::from_codes(array![[0, 3]], vec!["a".into()]).unwrap_err();
        assert_eq!(err, ArrayError::InvalidCategoryCode { code: 3, len: 2 });
    }

    #[rstest]
    #[case::prefix(LabelArray::starts_with, "te", [[true, false, false], [true, true, false]])]
    #[case::suffix(LabelArray::ends_with, "gy", [[false, false, true], [false, false, false]])]
    #[case::substring(LabelArray::contains, "ec", [[true, false, false], [true, true, false]])]
    #[case::equal(LabelArray::eq_label, "tech", [[true, false, false], [false, true, false]])]
    #[case::not_equal(LabelArray::ne_label, "tech", [[false, false, true], [true, false, false]])]
    fn test_string_predicates(
        #[case] op: fn(&LabelArray, &str) -> Array2<bool>,
        #[case] arg: &str,
        #[case] expected: [[bool; 3]; 2],
    ) {
        let labels = sectors();
        assert_eq!(op(&labels, arg), Array2::from(expected.to_vec()));
    }

    #[test]
    fn test_eq_unknown_label_is_all_false() {
        assert!(sectors().eq_label("utilities").iter().all(|v| !v));
    }

    #[test]
    fn test_is_in() {
        let mask = sectors().is_in(&["energy", "telecom"]);
        assert_eq!(mask, array![[false, false, true], [true, false, false]]);
    }

    #[test]
    fn test_fill_region_extends_dictionary() {
        let mut labels = sectors();
        labels.fill_region((0, 1), (1, 1), Some("utilities"));
        assert_eq!(labels.categories().len(), 4);
        assert_eq!(labels.get(0, 1), Some("utilities"));
        assert_eq!(labels.get(1, 1), Some("utilities"));
        labels.fill_region((0, 0), (0, 0), None);
        assert_eq!(labels.get(0, 0), None);
    }

    #[test]
    fn test_map_labels_merges_categories() {
        let mapped = sectors().map_labels(|label| {
            if label == "energy" {
                None
            } else {
                Some("other".to_string())
            }
        });
        assert_eq!(mapped.categories(), &["other"]);
        assert_eq!(mapped.get(0, 2), None);
        assert_eq!(mapped.get(1, 0), Some("other"));
    }

    #[test]
    fn test_concat_merges_dictionaries() {
        let top = LabelArray::new((1, 2), [Some("a"), Some("b")]).unwrap();
        let bottom = LabelArray::new((1, 2), [Some("c"), Some("a")]).unwrap();
        let merged = LabelArray::concat_rows(&[&top, &bottom]).unwrap();
        assert_eq!(merged.shape(), (2, 2));
        assert_eq!(merged.get(1, 0), Some("c"));
        assert_eq!(merged.get(1, 1), Some("a"));
        assert_eq!(merged.code_of("a"), Some(1));
    }

    #[test]
    fn test_equality_is_semantic() {
        let a = LabelArray::new((1, 2), [Some("x"), Some("y")]).unwrap();
        let b = LabelArray::from_codes(array![[2, 1]], vec!["y".into(), "x".into()]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_select_columns_and_slice_rows() {
        let labels = sectors();
        let picked = labels.select_columns(&[2, 0]);
        assert_eq!(picked.get(0, 0), Some("energy"));
        assert_eq!(picked.get(1, 1), Some("telecom"));
        let row = labels.slice_rows(1, 2);
        assert_eq!(row.shape(), (1, 3));
        assert_eq!(row.get(0, 1), Some("tech"));
    }
}
