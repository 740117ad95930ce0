use crate::{
    circuits::{CompareParams, GreaterOrEqual, conditional_select},
    data_types::SInt,
    factory::{SpdzFactory, SpdzProducer},
    producer::{Parallel, Sequential, SimpleProtocol},
};

/// Swaps two key-value pairs in place so that the left pair has the larger key.
///
/// Pairs with equal keys are left as they are. The keys must be smaller than
/// `2^params.bit_length`.
pub fn keyed_compare_and_swap(
    factory: &SpdzFactory,
    params: CompareParams,
    left: (&SInt, &SInt),
    right: (&SInt, &SInt),
) -> SpdzProducer {
    let factory = factory.clone();
    let (left_key, left_value) = (left.0.clone(), left.1.clone());
    let (right_key, right_value) = (right.0.clone(), right.1.clone());
    Box::new(SimpleProtocol::new(move || {
        let f = &factory;
        let keep = f.sint();
        let key_sum = f.sint();
        let value_sum = f.sint();
        let prepare = Parallel::new()
            .with(GreaterOrEqual::new(f, params, &left_key, &right_key, &keep)?.into_producer())
            .with(f.add(&left_key, &right_key, &key_sum))
            .with(f.add(&left_value, &right_value, &value_sum));
        let select = Parallel::new()
            .with(conditional_select(f, &keep, &left_key, &right_key, &left_key))
            .with(conditional_select(f, &keep, &left_value, &right_value, &left_value));
        let restore = Parallel::new()
            .with(f.sub(&key_sum, &left_key, &right_key))
            .with(f.sub(&value_sum, &left_value, &right_value));
        Ok(Box::new(
            Sequential::new()
                .then(prepare)
                .then(select)
                .then(restore),
        ) as SpdzProducer)
    }))
}
