//! Row-wise evaluation of computed terms.
//!
//! [`evaluate`] computes one term over one chunk once its inputs are ready.
//! Elementwise terms (window length 0) get each input as a block aligned to
//! the output rows. Windowed terms get one traversal per input and are
//! computed row by row on the assets passing the mask. Whatever the kind,
//! cells outside the mask end up holding the term's missing value.

use crate::custom::{RowContext, RowValues};
use crate::error::ComputeError;
use crate::expr::is_true;
use crate::sid::Sid;
use crate::stats;
use crate::term::{ClassifierOp, Term, TermKind, Transform};
use chrono::NaiveDate;
use ndarray::{Array2, ArrayView2, Axis};
use strata_adjusted::{AdjustedArrayWindow, ArrayData, DType, NAT, Scalar};

/// Result type for term computation.
pub type Result<T> = std::result::Result<T, ComputeError>;

/// One input as handed to [`evaluate`].
#[derive(Debug, Clone)]
pub enum TermInput {
    /// Rows aligned one-to-one with the output rows
    Block(ArrayData),
    /// Traversal yielding one window per output row
    Window(AdjustedArrayWindow),
}

/// Rows and assets being computed.
#[derive(Debug, Clone, Copy)]
pub struct ComputeContext<'a> {
    /// Output sessions
    pub dates: &'a [NaiveDate],
    /// Output assets
    pub sids: &'a [Sid],
    /// Term mask, `dates.len() x sids.len()`
    pub mask: &'a Array2<bool>,
}

impl ComputeContext<'_> {
    /// (rows, assets).
    pub const fn shape(&self) -> (usize, usize) {
        (self.dates.len(), self.sids.len())
    }

    fn masked_columns(&self, row: usize) -> Vec<usize> {
        self.mask
            .row(row)
            .iter()
            .enumerate()
            .filter_map(|(c, &m)| m.then_some(c))
            .collect()
    }
}

/// Compute `term` from its inputs.
pub fn evaluate(term: &Term, inputs: Vec<TermInput>, ctx: &ComputeContext<'_>) -> Result<ArrayData> {
    let shape = ctx.shape();
    if ctx.mask.dim() != shape {
        return Err(ComputeError::ShapeMismatch {
            term: term.to_string(),
            expected: shape,
            actual: ctx.mask.dim(),
        });
    }
    if inputs.len() != term.inputs().len() {
        return Err(ComputeError::InputCount {
            term: term.to_string(),
            expected: term.inputs().len(),
            actual: inputs.len(),
        });
    }

    let out = match term.kind() {
        TermKind::AssetExists | TermKind::Column(_) => {
            return Err(ComputeError::NotComputable {
                term: term.to_string(),
            });
        }
        TermKind::Constant(value) => ArrayData::full(value, shape),
        TermKind::StaticAssets(assets) => {
            let row: Vec<bool> = ctx.sids.iter().map(|sid| assets.contains(sid)).collect();
            ArrayData::Bool(Array2::from_shape_fn(shape, |(_, c)| row[c]))
        }
        TermKind::Latest => latest(term, windows(term, inputs)?, shape)?,
        TermKind::Window(kernel) => {
            let mut cursors = windows(term, inputs)?;
            let mut out = Array2::from_elem(shape, f64::NAN);
            for row in 0..shape.0 {
                let cols = ctx.masked_columns(row);
                let mut promoted = Vec::with_capacity(cursors.len());
                for (index, cursor) in cursors.iter_mut().enumerate() {
                    let window = cursor.next_window().ok_or_else(|| exhausted(term, index, row))?;
                    let selected = window.select_columns(&cols);
                    promoted.push(float_input(term, index, &selected)?);
                }
                let views: Vec<ArrayView2<'_, f64>> = promoted.iter().map(Array2::view).collect();
                for (&c, value) in cols.iter().zip(kernel.compute(&views)) {
                    out[[row, c]] = value;
                }
            }
            from_float(out, term.dtype())
        }
        TermKind::Custom(kernel) => {
            let mut cursors = windows(term, inputs)?;
            let mut out = ArrayData::full(term.missing_value(), shape);
            for row in 0..shape.0 {
                let cols = ctx.masked_columns(row);
                let mut selected = Vec::with_capacity(cursors.len());
                for (index, cursor) in cursors.iter_mut().enumerate() {
                    let window = cursor.next_window().ok_or_else(|| exhausted(term, index, row))?;
                    selected.push(window.select_columns(&cols));
                }
                let sids: Vec<Sid> = cols.iter().map(|&c| ctx.sids[c]).collect();
                let row_ctx = RowContext {
                    date: ctx.dates[row],
                    sids: &sids,
                };
                let values = kernel
                    .compute(&row_ctx, &selected)
                    .map_err(|e| ComputeError::Kernel {
                        term: term.to_string(),
                        message: e.to_string(),
                    })?;
                scatter(term, &mut out, row, &cols, values)?;
            }
            out
        }
        TermKind::Expression(expr) => {
            let blocks = blocks(term, inputs, shape)?;
            let promoted = blocks
                .iter()
                .enumerate()
                .map(|(index, data)| float_input(term, index, data))
                .collect::<Result<Vec<_>>>()?;
            from_float(expr.eval(&promoted, shape), term.dtype())
        }
        TermKind::Rank {
            method,
            ascending,
            grouped,
        } => {
            let (values, groups) = cross_section_inputs(term, inputs, ctx, *grouped)?;
            let (method, ascending) = (*method, *ascending);
            let ranked = by_row(&values, groups.as_ref(), |row| {
                stats::rank(row, method, ascending)
            });
            ArrayData::Float64(ranked)
        }
        TermKind::Transform { kind, grouped } => {
            let (values, groups) = cross_section_inputs(term, inputs, ctx, *grouped)?;
            let f = match kind {
                Transform::Demean => stats::demean,
                Transform::ZScore => stats::zscore,
            };
            ArrayData::Float64(by_row(&values, groups.as_ref(), f))
        }
        TermKind::Quantiles { bins } => {
            let (values, _) = cross_section_inputs(term, inputs, ctx, false)?;
            let mut out = Array2::from_elem(shape, -1i64);
            for (mut out_row, row) in out.rows_mut().into_iter().zip(values.rows()) {
                let row: Vec<f64> = row.to_vec();
                for (o, q) in out_row.iter_mut().zip(stats::quantiles(&row, *bins)) {
                    *o = q;
                }
            }
            ArrayData::Int64(out)
        }
        TermKind::PercentileBetween { min, max } => {
            let (values, _) = cross_section_inputs(term, inputs, ctx, false)?;
            let mut out = Array2::from_elem(shape, false);
            for (mut out_row, row) in out.rows_mut().into_iter().zip(values.rows()) {
                let row: Vec<f64> = row.to_vec();
                let sorted = stats::sorted_finite(&row);
                let lo = stats::percentile(&sorted, min.get());
                let hi = stats::percentile(&sorted, max.get());
                for (o, v) in out_row.iter_mut().zip(&row) {
                    *o = *v >= lo && *v <= hi;
                }
            }
            ArrayData::Bool(out)
        }
        TermKind::NullCheck { negate } => {
            let blocks = blocks(term, inputs, shape)?;
            let missing = blocks[0].is_missing(term.inputs()[0].missing_value());
            let negate = *negate;
            ArrayData::Bool(missing.mapv(|m| m != negate))
        }
        TermKind::FillNa(value) => {
            let blocks = blocks(term, inputs, shape)?;
            let present = blocks[0]
                .is_missing(term.inputs()[0].missing_value())
                .mapv(|m| !m);
            blocks[0].where_mask(&present, value)?
        }
        TermKind::LabelPredicate(op) => {
            let blocks = blocks(term, inputs, shape)?;
            ArrayData::Bool(label_predicate(term, op, &blocks[0])?)
        }
    };

    if out.shape() != shape {
        return Err(ComputeError::ShapeMismatch {
            term: term.to_string(),
            expected: shape,
            actual: out.shape(),
        });
    }
    Ok(out.where_mask(ctx.mask, term.missing_value())?)
}

/// Promote `data` to floats with missing cells as `NaN`; booleans are 1 / 0.
pub fn as_float(data: &ArrayData, missing: &Scalar) -> Option<Array2<f64>> {
    match data {
        ArrayData::Float64(a) => match missing.as_f64() {
            Some(m) if !m.is_nan() => Some(a.mapv(|v| if v == m { f64::NAN } else { v })),
            _ => Some(a.clone()),
        },
        ArrayData::Int64(a) => {
            let m = missing.as_i64();
            Some(a.mapv(|v| if Some(v) == m { f64::NAN } else { v as f64 }))
        }
        ArrayData::Datetime(a) => {
            let m = missing.as_i64();
            Some(a.mapv(|v| {
                if v == NAT || Some(v) == m {
                    f64::NAN
                } else {
                    v as f64
                }
            }))
        }
        ArrayData::Bool(a) => Some(a.mapv(|v| if v { 1.0 } else { 0.0 })),
        ArrayData::Categorical(_) => None,
    }
}

fn exhausted(term: &Term, index: usize, row: usize) -> ComputeError {
    ComputeError::WindowExhausted {
        term: term.to_string(),
        index,
        row,
    }
}

fn float_input(term: &Term, index: usize, data: &ArrayData) -> Result<Array2<f64>> {
    let missing = term.inputs()[index].missing_value();
    as_float(data, missing).ok_or_else(|| ComputeError::InputKind {
        term: term.to_string(),
        index,
        expected: "numeric or boolean",
    })
}

fn from_float(values: Array2<f64>, dtype: DType) -> ArrayData {
    match dtype {
        DType::Bool => ArrayData::Bool(values.mapv(is_true)),
        _ => ArrayData::Float64(values),
    }
}

fn windows(term: &Term, inputs: Vec<TermInput>) -> Result<Vec<AdjustedArrayWindow>> {
    inputs
        .into_iter()
        .enumerate()
        .map(|(index, input)| match input {
            TermInput::Window(w) => Ok(w),
            TermInput::Block(_) => Err(ComputeError::InputKind {
                term: term.to_string(),
                index,
                expected: "a window traversal",
            }),
        })
        .collect()
}

fn blocks(term: &Term, inputs: Vec<TermInput>, shape: (usize, usize)) -> Result<Vec<ArrayData>> {
    inputs
        .into_iter()
        .enumerate()
        .map(|(index, input)| match input {
            TermInput::Block(data) if data.shape() == shape => Ok(data),
            TermInput::Block(data) => Err(ComputeError::ShapeMismatch {
                term: term.to_string(),
                expected: shape,
                actual: data.shape(),
            }),
            TermInput::Window(_) => Err(ComputeError::InputKind {
                term: term.to_string(),
                index,
                expected: "a block",
            }),
        })
        .collect()
}

fn latest(
    term: &Term,
    mut cursors: Vec<AdjustedArrayWindow>,
    shape: (usize, usize),
) -> Result<ArrayData> {
    let Some(cursor) = cursors.first_mut() else {
        return Err(ComputeError::InputCount {
            term: term.to_string(),
            expected: 1,
            actual: 0,
        });
    };
    let mut rows = Vec::with_capacity(shape.0);
    for row in 0..shape.0 {
        let window = cursor.next_window().ok_or_else(|| exhausted(term, 0, row))?;
        let (len, _) = window.shape();
        rows.push(window.to_data().slice_rows(len.saturating_sub(1), len));
    }
    if rows.is_empty() {
        return Ok(ArrayData::full(term.missing_value(), shape));
    }
    let refs: Vec<&ArrayData> = rows.iter().collect();
    Ok(ArrayData::concat_rows(&refs)?)
}

/// Values with masked-out cells as `NaN`, plus group ids when grouped.
fn cross_section_inputs(
    term: &Term,
    inputs: Vec<TermInput>,
    ctx: &ComputeContext<'_>,
    grouped: bool,
) -> Result<(Array2<f64>, Option<Array2<Option<i64>>>)> {
    let blocks = blocks(term, inputs, ctx.shape())?;
    let mut values = float_input(term, 0, &blocks[0])?;
    values.zip_mut_with(ctx.mask, |v, &m| {
        if !m {
            *v = f64::NAN;
        }
    });
    let groups = if grouped {
        let classifier = &term.inputs()[1];
        Some(group_ids(&blocks[1], classifier.missing_value()).ok_or_else(|| {
            ComputeError::InputKind {
                term: term.to_string(),
                index: 1,
                expected: "a classifier",
            }
        })?)
    } else {
        None
    };
    Ok((values, groups))
}

fn group_ids(data: &ArrayData, missing: &Scalar) -> Option<Array2<Option<i64>>> {
    match data {
        ArrayData::Int64(a) => {
            let m = missing.as_i64();
            Some(a.mapv(|v| (Some(v) != m).then_some(v)))
        }
        ArrayData::Categorical(labels) => {
            let missing_code = missing.as_label().and_then(|l| labels.code_of(l));
            Some(labels.codes().mapv(|code| {
                (code != strata_adjusted::MISSING_CODE && Some(code) != missing_code)
                    .then_some(i64::from(code))
            }))
        }
        _ => None,
    }
}

fn by_row<F>(values: &Array2<f64>, groups: Option<&Array2<Option<i64>>>, f: F) -> Array2<f64>
where
    F: Fn(&[f64]) -> Vec<f64>,
{
    let mut out = Array2::from_elem(values.dim(), f64::NAN);
    for (r, row) in values.axis_iter(Axis(0)).enumerate() {
        let row: Vec<f64> = row.to_vec();
        let computed = match groups {
            Some(groups) => {
                let ids: Vec<Option<i64>> = groups.row(r).to_vec();
                stats::grouped(&row, &ids, &f)
            }
            None => f(&row),
        };
        for (o, v) in out.row_mut(r).iter_mut().zip(computed) {
            *o = v;
        }
    }
    out
}

fn scatter(
    term: &Term,
    out: &mut ArrayData,
    row: usize,
    cols: &[usize],
    values: RowValues,
) -> Result<()> {
    if values.len() != cols.len() || values.dtype() != term.dtype() {
        return Err(ComputeError::Kernel {
            term: term.to_string(),
            message: format!(
                "returned {} {} values for {} assets",
                values.len(),
                values.dtype(),
                cols.len()
            ),
        });
    }
    match (out, values) {
        (ArrayData::Float64(a), RowValues::Float64(v)) => {
            cols.iter().zip(v).for_each(|(&c, x)| a[[row, c]] = x);
        }
        (ArrayData::Int64(a), RowValues::Int64(v)) => {
            cols.iter().zip(v).for_each(|(&c, x)| a[[row, c]] = x);
        }
        (ArrayData::Bool(a), RowValues::Bool(v)) => {
            cols.iter().zip(v).for_each(|(&c, x)| a[[row, c]] = x);
        }
        _ => {
            return Err(ComputeError::Kernel {
                term: term.to_string(),
                message: "output dtype does not match the term".to_string(),
            });
        }
    }
    Ok(())
}

fn label_predicate(term: &Term, op: &ClassifierOp, data: &ArrayData) -> Result<Array2<bool>> {
    let missing = term.inputs()[0].missing_value();
    let wrong_kind = || ComputeError::InputKind {
        term: term.to_string(),
        index: 0,
        expected: "a classifier matching the predicate",
    };
    match data {
        ArrayData::Categorical(labels) => {
            let label = |v: &Scalar| v.as_label().map(str::to_string).ok_or_else(wrong_kind);
            let present = data.is_missing(missing).mapv(|m| !m);
            let mut out = match op {
                ClassifierOp::Eq(v) => labels.eq_label(&label(v)?),
                ClassifierOp::Ne(v) => labels.ne_label(&label(v)?),
                ClassifierOp::IsIn(values) => {
                    let choices = values.iter().map(label).collect::<Result<Vec<_>>>()?;
                    labels.is_in(&choices)
                }
                ClassifierOp::StartsWith(s) => labels.starts_with(s),
                ClassifierOp::EndsWith(s) => labels.ends_with(s),
                ClassifierOp::Contains(s) => labels.contains(s),
            };
            out.zip_mut_with(&present, |o, &p| *o &= p);
            Ok(out)
        }
        ArrayData::Int64(a) => {
            let m = missing.as_i64();
            let int = |v: &Scalar| v.as_i64().ok_or_else(wrong_kind);
            match op {
                ClassifierOp::Eq(v) => {
                    let v = int(v)?;
                    Ok(a.mapv(|x| x == v && Some(x) != m))
                }
                ClassifierOp::Ne(v) => {
                    let v = int(v)?;
                    Ok(a.mapv(|x| x != v && Some(x) != m))
                }
                ClassifierOp::IsIn(values) => {
                    let values = values.iter().map(int).collect::<Result<Vec<_>>>()?;
                    Ok(a.mapv(|x| values.contains(&x) && Some(x) != m))
                }
                ClassifierOp::StartsWith(_) | ClassifierOp::EndsWith(_) | ClassifierOp::Contains(_) => {
                    Err(wrong_kind())
                }
            }
        }
        _ => Err(wrong_kind()),
    }
}
