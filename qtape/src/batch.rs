//! Batched arguments and parameters
//!
//! Arguments may carry a leading batch dimension. A batched call
//! materializes one trace per batch index, holding unbatched arguments
//! fixed, executes every trace in one job and stacks the per-index
//! results along a new leading dimension. All batched inputs must agree
//! on the batch size.

use qtape_core::{Argument, QuantumError, Result, Tensor, Trace, TransformResult};

/// Common batch size of the batched arguments
///
/// Returns `None` when no argument is batched.
///
/// # Errors
/// Returns `ShapeMismatch` if two batched arguments disagree.
pub fn batch_size(args: &[Argument]) -> Result<Option<usize>> {
    let mut size: Option<(usize, usize)> = None;
    for (i, arg) in args.iter().enumerate() {
        let Some(b) = arg.batch_size() else {
            continue;
        };
        match size {
            None => size = Some((i, b)),
            Some((first, s)) if s != b => {
                return Err(QuantumError::shape_mismatch(format!(
                    "argument {} has batch size {}, argument {} has batch size {}",
                    first, s, i, b
                )));
            }
            Some(_) => {}
        }
    }
    Ok(size.map(|(_, s)| s))
}

/// One argument list per batch index
///
/// Unbatched arguments are repeated in every list. Without batched
/// arguments the result is the single list `args`.
pub fn unbatch_arguments(args: &[Argument]) -> Result<Vec<Vec<Argument>>> {
    let Some(size) = batch_size(args)? else {
        return Ok(vec![args.to_vec()]);
    };
    (0..size)
        .map(|b| {
            args.iter()
                .map(|a| {
                    if a.is_batched() {
                        a.batch_slice(b)
                    } else {
                        Ok(a.clone())
                    }
                })
                .collect()
        })
        .collect()
}

/// Stack per-index results along a new leading dimension
///
/// An empty batch gives a tensor of leading dimension zero.
pub fn stack_batch(results: Vec<Tensor>, item_shape: &[usize]) -> Result<Tensor> {
    if results.is_empty() {
        let mut shape = vec![0];
        shape.extend_from_slice(item_shape);
        return Ok(Tensor::zeros(shape));
    }
    Tensor::stack(&results)
}

/// Batch the trainable parameters of a trace
///
/// `params[k]` gives the values of trainable parameter `k`: either a
/// one-dimensional batched argument with one value per batch index, or
/// an unbatched scalar held fixed across the batch. Produces one trace
/// per batch index; combining stacks their results.
///
/// # Errors
/// Returns `InvalidArgument` if the number of parameter bindings differs
/// from the number of trainable parameters or nothing is batched, and
/// `ShapeMismatch` if batch sizes differ or a binding has more than one
/// value per batch index.
pub fn batch_params(trace: &Trace, params: &[Argument]) -> Result<TransformResult> {
    let trainable = trace.trainable_params();
    if params.len() != trainable.len() {
        return Err(QuantumError::InvalidArgument(format!(
            "trace has {} trainable parameters, {} bindings given",
            trainable.len(),
            params.len()
        )));
    }
    let size = batch_size(params)?.ok_or_else(|| {
        QuantumError::InvalidArgument("no parameter binding carries a batch dimension".to_string())
    })?;
    for (k, p) in params.iter().enumerate() {
        let per_index = if p.is_batched() { size } else { 1 };
        if p.len() != per_index {
            return Err(QuantumError::shape_mismatch(format!(
                "binding {} has shape {:?}; expected one value per batch index",
                k,
                p.shape()
            )));
        }
    }

    let base = trace.parameters();
    let traces = (0..size)
        .map(|b| {
            let mut values = base.clone();
            for (p, &idx) in params.iter().zip(&trainable) {
                values[idx] = if p.is_batched() { p.values()[b] } else { p.values()[0] };
            }
            trace.with_parameters(&values)
        })
        .collect::<Result<Vec<_>>>()?;
    log::debug!("batch_params: {} traces", traces.len());

    let item_shape = trace.output_shape()?;
    Ok(TransformResult::new(traces, move |results| {
        stack_batch(results, &item_shape)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use qtape_core::{ops, Measurement, Operation, PauliWord, Var};

    fn batched(values: Vec<f64>) -> Argument {
        Argument::batched(vec![values.len()], values).unwrap()
    }

    #[test]
    fn test_batch_size_agreement() {
        let args = [batched(vec![0.1, 0.2, 0.3]), Argument::scalar(1.0), batched(vec![1.0, 2.0, 3.0])];
        assert_eq!(batch_size(&args).unwrap(), Some(3));
        assert_eq!(batch_size(&[Argument::scalar(1.0)]).unwrap(), None);

        let mismatched = [batched(vec![0.1, 0.2, 0.3]), batched(vec![0.1, 0.2])];
        assert!(matches!(
            batch_size(&mismatched),
            Err(QuantumError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_unbatch_holds_unbatched_fixed() {
        let args = [
            Argument::batched(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap(),
            Argument::scalar(9.0),
        ];
        let lists = unbatch_arguments(&args).unwrap();
        assert_eq!(lists.len(), 2);
        assert_eq!(lists[1][0].values(), &[3.0, 4.0]);
        assert_eq!(lists[1][0].shape(), &[2]);
        assert_eq!(lists[0][1].values(), &[9.0]);
    }

    #[test]
    fn test_batch_params() {
        let trace = Trace::new(
            1,
            vec![
                Operation::on(&ops::RX, [Var::trainable(0.0)], &[0]).unwrap(),
                Operation::on(&ops::RY, [0.4], &[0]).unwrap(),
                Operation::on(&ops::RZ, [Var::trainable(0.0)], &[0]).unwrap(),
            ],
            vec![Measurement::expval(PauliWord::z(0))],
        )
        .unwrap();
        let r = batch_params(&trace, &[batched(vec![0.1, 0.2, 0.3]), Argument::scalar(0.7)]).unwrap();
        assert_eq!(r.len(), 3);
        assert_eq!(r.traces()[2].parameters(), vec![0.3, 0.4, 0.7]);

        let results = (0..3).map(|i| Tensor::scalar(i as f64)).collect();
        assert_eq!(r.combine(results).unwrap().shape(), &[3]);

        assert!(batch_params(&trace, &[Argument::scalar(0.1)]).is_err());
        assert!(matches!(
            batch_params(&trace, &[batched(vec![0.1, 0.2, 0.3]), batched(vec![0.1, 0.2])]),
            Err(QuantumError::ShapeMismatch(_))
        ));
    }
}
