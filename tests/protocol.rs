use polytune_spdz::{
    circuits::{
        CompareParams, GreaterOrEqual, LinearLookUp, equality, inner_product,
        keyed_compare_and_swap,
    },
    config::{Config, MacCheckPolicy},
    data_types::{OInt, SInt, ShareElement},
    factory::{SpdzFactory, SpdzProducer},
    field::Fp,
    producer::{Parallel, Sequential, SimpleProtocol},
    protocol::{Error, MpcError, PartyResult, simulate_mpc},
    supplier::{DealerConfig, DealerLimits, MaterialKind, PreprocessingError},
};

const PARAMS: CompareParams = CompareParams {
    bit_length: 8,
    statistical_security: 40,
};

fn dealer() -> DealerConfig {
    DealerConfig::new([42; 32])
}

fn input(f: &SpdzFactory, value: u64, owner: usize, out: &SInt) -> SpdzProducer {
    let value = (f.context().party == owner).then(|| Fp::from(value));
    f.input(value, owner, out)
}

fn opened(results: &[PartyResult<OInt>]) -> Result<Vec<Fp>, Error> {
    results.iter().map(|r| r.output.value()).collect()
}

fn run(
    parties: usize,
    build: impl Fn(&SpdzFactory) -> Result<(SpdzProducer, OInt), Error>,
) -> Result<Vec<PartyResult<OInt>>, Error> {
    simulate_mpc(parties, &Config::default(), &dealer(), build)
}

#[test]
fn input_then_output() -> Result<(), Error> {
    for parties in [2, 3] {
        let results = run(parties, |f| {
            let (x, out) = (f.sint(), f.oint());
            let tree = Sequential::new()
                .then(input(f, 10, 0, &x))
                .then(f.open(&x, &out));
            Ok((Box::new(tree), out))
        })?;
        assert_eq!(opened(&results)?, vec![Fp::from(10u64); parties]);
        for result in &results {
            assert_eq!(result.stats.rounds, 2);
            assert_eq!(result.preprocessing.input_masks, 1);
        }
    }
    Ok(())
}

#[test]
fn output_to_single_party() -> Result<(), Error> {
    let results = run(3, |f| {
        let (x, out) = (f.sint(), f.oint());
        let tree = Sequential::new()
            .then(input(f, 10, 2, &x))
            .then(f.open_to(&x, 1, &out));
        Ok((Box::new(tree), out))
    })?;
    assert_eq!(results[0].output.try_value(), None);
    assert_eq!(results[1].output.try_value(), Some(Fp::from(10u64)));
    assert_eq!(results[2].output.try_value(), None);
    Ok(())
}

#[test]
fn add_public_constant() -> Result<(), Error> {
    let results = run(2, |f| {
        let (x, sum, out) = (f.sint(), f.sint(), f.oint());
        let tree = Sequential::new()
            .then(input(f, 10, 0, &x))
            .then(f.add_public(&x, &f.oint_from(4u64), &sum))
            .then(f.open(&sum, &out));
        Ok((Box::new(tree), out))
    })?;
    assert_eq!(opened(&results)?, vec![Fp::from(14u64); 2]);
    Ok(())
}

#[test]
fn mult_of_inputs_from_different_parties() -> Result<(), Error> {
    for parties in [2, 3] {
        let results = run(parties, |f| {
            let (x, y, sum, product, out) = (f.sint(), f.sint(), f.sint(), f.sint(), f.oint());
            let tree = Sequential::new()
                .then(
                    Parallel::new()
                        .with(input(f, 10, 0, &x))
                        .with(input(f, 5, parties - 1, &y)),
                )
                .then(f.add(&x, &y, &sum))
                .then(f.mult(&x, &sum, &product))
                .then(f.open(&product, &out));
            Ok((Box::new(tree), out))
        })?;
        assert_eq!(opened(&results)?, vec![Fp::from(150u64); parties]);
        for result in &results {
            assert_eq!(result.preprocessing.triples, 1);
        }
    }
    Ok(())
}

#[test]
fn linear_operations_with_public_values() -> Result<(), Error> {
    let results = run(3, |f| {
        let x = f.sint();
        let (a, b, c, d) = (f.sint(), f.sint(), f.sint(), f.sint());
        let (inverse, out) = (f.oint(), f.oint());
        let three = f.oint_from(3u64);
        let tree = Sequential::new()
            .then(input(f, 20, 1, &x))
            .then(f.local_invert(&three, &inverse))
            // a = 20 - 3, b = 3 - 20, c = 3 * 20, d = a + b + c / 3
            .then(
                Parallel::new()
                    .with(f.sub_public(&x, &three, &a))
                    .with(f.sub_from_public(&three, &x, &b))
                    .with(f.mult_public(&three, &x, &c)),
            )
            .then(f.mult_public(&inverse, &c, &c))
            .then(f.sum(&[a.clone(), b.clone(), c.clone()], &d))
            .then(f.open(&d, &out));
        Ok((Box::new(tree), out))
    })?;
    assert_eq!(opened(&results)?, vec![Fp::from(20u64); 3]);
    Ok(())
}

#[test]
fn known_constants_and_negative_values() -> Result<(), Error> {
    let results = run(2, |f| {
        let (x, out) = (f.sint(), f.oint());
        let tree = Sequential::new()
            .then(f.sub(&f.known(5u64), &f.known(Fp::from(-7i64)), &x))
            .then(f.mult(&x, &f.sqrt_of_max(), &x))
            .then(f.open(&x, &out));
        Ok((Box::new(tree), out))
    })?;
    let expected = Fp::from(12u64) * Fp::power_of_two(63);
    assert_eq!(opened(&results)?, vec![expected; 2]);
    Ok(())
}

#[test]
fn inner_product_consumes_one_triple_per_product() -> Result<(), Error> {
    let results = run(2, |f| {
        let xs: Vec<SInt> = (0..4).map(|_| f.sint()).collect();
        let ys: Vec<SInt> = (0..4).map(|_| f.known(2u64)).collect();
        let (result, out) = (f.sint(), f.oint());
        let mut inputs = Parallel::new();
        for (i, x) in xs.iter().enumerate() {
            inputs.append(input(f, i as u64 + 1, i % 2, x));
        }
        let tree = Sequential::new()
            .then(inputs)
            .then(inner_product(f, &xs, &ys, &result)?)
            .then(f.open(&result, &out));
        Ok((Box::new(tree), out))
    })?;
    assert_eq!(opened(&results)?, vec![Fp::from(20u64); 2]);
    for result in &results {
        assert_eq!(result.preprocessing.triples, 4);
        // inputs, products and the opening each take one exchange
        assert_eq!(result.stats.rounds, 3);
    }
    Ok(())
}

#[test]
fn mismatched_inner_product_is_rejected() {
    let result = run(2, |f| {
        let tree = inner_product(f, &[f.sint()], &[], &f.sint())?;
        Ok((tree, f.oint()))
    });
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn random_material_is_well_formed() -> Result<(), Error> {
    let results = simulate_mpc(2, &Config::default(), &dealer(), |f| {
        let bit = f.sint();
        let pipe: Vec<SInt> = (0..3).map(|_| f.sint()).collect();
        let random = f.sint();
        let outs: Vec<OInt> = (0..5).map(|_| f.oint()).collect();
        let tree = Sequential::new()
            .then(
                Parallel::new()
                    .with(f.random_bit(&bit))
                    .with(f.exp_pipe(&pipe))
                    .with(f.random_sint(&random)),
            )
            .then(
                Parallel::new()
                    .with(f.open(&bit, &outs[0]))
                    .with(f.open(&pipe[0], &outs[1]))
                    .with(f.open(&pipe[1], &outs[2]))
                    .with(f.open(&pipe[2], &outs[3]))
                    .with(f.open(&random, &outs[4])),
            );
        Ok((Box::new(tree) as SpdzProducer, outs))
    })?;
    for result in results {
        let v = result
            .output
            .iter()
            .map(OInt::value)
            .collect::<Result<Vec<_>, _>>()?;
        assert!(v[0] == Fp::ZERO || v[0] == Fp::ONE);
        assert_eq!(v[1] * v[2], Fp::ONE);
        assert_eq!(v[3], v[2] * v[2]);
        assert_eq!(result.preprocessing.bits, 1);
        assert_eq!(result.preprocessing.exp_pipes, 1);
        assert_eq!(result.preprocessing.triples, 1);
    }
    Ok(())
}

#[test]
fn clear_exp_pipe_of_opened_value() -> Result<(), Error> {
    let results = simulate_mpc(2, &Config::default(), &dealer(), |f| {
        let (x, opened) = (f.sint(), f.oint());
        let pipe: Vec<OInt> = (0..3).map(|_| f.oint()).collect();
        let tree = Sequential::new()
            .then(input(f, 4, 0, &x))
            .then(f.open(&x, &opened))
            .then(f.exp_from_public(&opened, &pipe));
        Ok((Box::new(tree) as SpdzProducer, pipe))
    })?;
    for result in results {
        let pipe = &result.output;
        assert_eq!(pipe[0].value()? * Fp::from(4u64), Fp::ONE);
        assert_eq!(pipe[1].value()?, Fp::from(4u64));
        assert_eq!(pipe[2].value()?, Fp::from(16u64));
    }
    Ok(())
}

#[test]
fn inverting_zero_aborts() {
    let result = run(2, |f| {
        let (x, opened, inverse) = (f.sint(), f.oint(), f.oint());
        let tree = Sequential::new()
            .then(input(f, 0, 1, &x))
            .then(f.open(&x, &opened))
            .then(f.local_invert(&opened, &inverse));
        Ok((Box::new(tree), inverse))
    });
    assert!(matches!(result, Err(Error::ZeroInversion)));
}

#[test]
fn exhausted_preprocessing_aborts() {
    let dealer = DealerConfig {
        limits: DealerLimits {
            triples: Some(1),
            ..Default::default()
        },
        ..dealer()
    };
    let result = simulate_mpc(2, &Config::default(), &dealer, |f| {
        let (x, y, out) = (f.known(3u64), f.sint(), f.oint());
        let tree = Sequential::new()
            .then(f.mult(&x, &x, &y))
            .then(f.mult(&y, &x, &y))
            .then(f.open(&y, &out));
        Ok((Box::new(tree) as SpdzProducer, out))
    });
    assert!(matches!(
        result,
        Err(Error::Preprocessing(PreprocessingError::Exhausted(
            MaterialKind::Triple
        )))
    ));
}

fn tampered_open(f: &SpdzFactory) -> Result<(SpdzProducer, OInt), Error> {
    let (x, out) = (f.sint(), f.oint());
    let mut tree = Sequential::new().then(input(f, 10, 0, &x));
    if f.context().party == 1 {
        let x = x.clone();
        tree.append(SimpleProtocol::new(move || {
            let share = x.share()?;
            x.set(ShareElement::new(share.value + Fp::ONE, share.mac));
            Ok(Box::new(Sequential::new()) as SpdzProducer)
        }));
    }
    tree.append(f.open(&x, &out));
    Ok((Box::new(tree), out))
}

#[test]
fn tampered_share_fails_mac_check() {
    for mac_check in [
        MacCheckPolicy::EveryRound,
        MacCheckPolicy::Batched { threshold: 1 },
        MacCheckPolicy::AtEnd,
    ] {
        let config = Config {
            mac_check,
            ..Default::default()
        };
        let result = simulate_mpc(2, &config, &dealer(), tampered_open);
        assert!(
            matches!(result, Err(Error::Mpc(MpcError::MacCheckFailed))),
            "{mac_check:?}: {result:?}"
        );
    }
}

#[test]
fn mac_check_policies_decide_check_count() -> Result<(), Error> {
    let build = |f: &SpdzFactory| -> Result<(SpdzProducer, OInt), Error> {
        let (x, y, z, out) = (f.sint(), f.sint(), f.sint(), f.oint());
        let tree = Sequential::new()
            .then(input(f, 3, 0, &x))
            .then(f.mult(&x, &x, &y))
            .then(f.mult(&y, &x, &z))
            .then(f.open(&z, &out));
        Ok((Box::new(tree) as SpdzProducer, out))
    };
    let every_round = Config {
        mac_check: MacCheckPolicy::EveryRound,
        ..Default::default()
    };
    let results = simulate_mpc(2, &every_round, &dealer(), build)?;
    assert_eq!(opened(&results)?, vec![Fp::from(27u64); 2]);
    // the input is only checked for consistency, each multiplication opens two values and the
    // output one
    assert_eq!(results[0].stats.mac_checks, 4);
    assert_eq!(results[0].stats.opened_values, 5);

    let at_end = Config {
        mac_check: MacCheckPolicy::AtEnd,
        ..Default::default()
    };
    let results = simulate_mpc(2, &at_end, &dealer(), build)?;
    assert_eq!(results[0].stats.mac_checks, 1);
    assert_eq!(results[0].stats.opened_values, 5);
    Ok(())
}

#[test]
fn tiny_batches_compute_the_same_result() -> Result<(), Error> {
    let config = Config {
        batch_size: 1,
        ..Default::default()
    };
    let results = simulate_mpc(3, &config, &dealer(), |f| {
        let xs: Vec<SInt> = (0..3).map(|_| f.sint()).collect();
        let (result, out) = (f.sint(), f.oint());
        let mut inputs = Parallel::new();
        for (p, x) in xs.iter().enumerate() {
            inputs.append(input(f, 2 + p as u64, p, x));
        }
        let tree = Sequential::new()
            .then(inputs)
            .then(inner_product(f, &xs, &xs, &result)?)
            .then(f.open(&result, &out));
        Ok((Box::new(tree) as SpdzProducer, out))
    })?;
    assert_eq!(opened(&results)?, vec![Fp::from(4u64 + 9 + 16); 3]);
    Ok(())
}

#[test]
fn invalid_config_is_rejected() {
    let config = Config {
        batch_size: 0,
        ..Default::default()
    };
    let result = simulate_mpc(2, &config, &dealer(), |f| {
        Ok((Box::new(Sequential::new()) as SpdzProducer, f.oint()))
    });
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn greater_or_equal_on_bounded_values() -> Result<(), Error> {
    let pairs: [(u64, u64); 7] = [
        (0, 0),
        (3, 5),
        (5, 3),
        (255, 0),
        (0, 255),
        (128, 127),
        (77, 77),
    ];
    let results = simulate_mpc(2, &Config::default(), &dealer(), |f| {
        let mut tree = Parallel::new();
        let mut outs = vec![];
        for (x, y) in pairs {
            let (sx, sy, ge, out) = (f.sint(), f.sint(), f.sint(), f.oint());
            tree.append(
                Sequential::new()
                    .then(
                        Parallel::new()
                            .with(input(f, x, 0, &sx))
                            .with(input(f, y, 1, &sy)),
                    )
                    .then(GreaterOrEqual::new(f, PARAMS, &sx, &sy, &ge)?.into_producer())
                    .then(f.open(&ge, &out)),
            );
            outs.push(out);
        }
        Ok((Box::new(tree) as SpdzProducer, outs))
    })?;
    for result in results {
        for ((x, y), out) in pairs.iter().zip(&result.output) {
            assert_eq!(out.value()?, Fp::from(x >= y), "{x} >= {y}");
        }
    }
    Ok(())
}

#[test]
fn equality_of_secret_values() -> Result<(), Error> {
    let pairs: [(u64, u64); 3] = [(7, 7), (7, 9), (0, 200)];
    let results = simulate_mpc(3, &Config::default(), &dealer(), |f| {
        let mut tree = Parallel::new();
        let mut outs = vec![];
        for (x, y) in pairs {
            let (eq, out) = (f.sint(), f.oint());
            tree.append(
                Sequential::new()
                    .then(equality(f, PARAMS, &f.known(x), &f.known(y), &eq)?)
                    .then(f.open(&eq, &out)),
            );
            outs.push(out);
        }
        Ok((Box::new(tree) as SpdzProducer, outs))
    })?;
    for result in results {
        let values = result
            .output
            .iter()
            .map(OInt::value)
            .collect::<Result<Vec<_>, _>>()?;
        assert_eq!(values, vec![Fp::ONE, Fp::ZERO, Fp::ZERO]);
    }
    Ok(())
}

fn lookup(key: u64) -> Result<Vec<Fp>, Error> {
    let results = run(2, |f| {
        let keys = [3u64, 7, 9].map(|k| f.known(k));
        let values = [30u64, 70, 90].map(|v| f.known(v));
        let (lookup_key, output, out) = (f.sint(), f.known(1234u64), f.oint());
        let table = LinearLookUp::new(f, PARAMS, &lookup_key, &keys, &values, &output)?;
        let tree = Sequential::new()
            .then(input(f, key, 1, &lookup_key))
            .then(table.into_producer())
            .then(f.open(&output, &out));
        Ok((Box::new(tree), out))
    })?;
    opened(&results)
}

#[test]
fn lookup_finds_matching_key() -> Result<(), Error> {
    assert_eq!(lookup(7)?, vec![Fp::from(70u64); 2]);
    Ok(())
}

#[test]
fn lookup_of_missing_key_keeps_output() -> Result<(), Error> {
    assert_eq!(lookup(5)?, vec![Fp::from(1234u64); 2]);
    Ok(())
}

#[test]
fn array_lookup_selects_whole_row() -> Result<(), Error> {
    let results = simulate_mpc(2, &Config::default(), &dealer(), |f| {
        let keys = [1u64, 2].map(|k| f.known(k));
        let values = vec![
            vec![f.known(10u64), f.known(11u64)],
            vec![f.known(20u64), f.known(21u64)],
        ];
        let outputs = [f.known(0u64), f.known(0u64)];
        let outs = [f.oint(), f.oint()];
        let table =
            LinearLookUp::array(f, PARAMS, &f.known(2u64), &keys, &values, &outputs)?;
        let tree = Sequential::new().then(table.into_producer()).then(
            Parallel::new()
                .with(f.open(&outputs[0], &outs[0]))
                .with(f.open(&outputs[1], &outs[1])),
        );
        Ok((Box::new(tree) as SpdzProducer, outs))
    })?;
    for result in results {
        assert_eq!(result.output[0].value()?, Fp::from(20u64));
        assert_eq!(result.output[1].value()?, Fp::from(21u64));
    }
    Ok(())
}

#[test]
fn lookup_with_mismatched_lengths_is_rejected() {
    let result = run(2, |f| {
        let keys = [f.known(1u64), f.known(2u64)];
        let table = LinearLookUp::new(f, PARAMS, &f.sint(), &keys, &[f.sint()], &f.sint())?;
        Ok((table.into_producer(), f.oint()))
    });
    assert!(matches!(result, Err(Error::Config(_))));
}

fn compare_and_swap(left: (u64, u64), right: (u64, u64)) -> Result<[Fp; 4], Error> {
    let results = simulate_mpc(2, &Config::default(), &dealer(), |f| {
        let handles = [(); 4].map(|_| f.sint());
        let outs = [(); 4].map(|_| f.oint());
        let mut inputs = Parallel::new();
        let mut opens = Parallel::new();
        for (i, (v, h)) in [left.0, left.1, right.0, right.1]
            .into_iter()
            .zip(&handles)
            .enumerate()
        {
            inputs.append(input(f, v, i % 2, h));
            opens.append(f.open(h, &outs[i]));
        }
        let tree = Sequential::new()
            .then(inputs)
            .then(keyed_compare_and_swap(
                f,
                PARAMS,
                (&handles[0], &handles[1]),
                (&handles[2], &handles[3]),
            ))
            .then(opens);
        Ok((Box::new(tree) as SpdzProducer, outs))
    })?;
    let outs = &results[1].output;
    Ok([
        outs[0].value()?,
        outs[1].value()?,
        outs[2].value()?,
        outs[3].value()?,
    ])
}

#[test]
fn compare_and_swap_moves_larger_key_left() -> Result<(), Error> {
    assert_eq!(
        compare_and_swap((5, 50), (9, 90))?,
        [9u64, 90, 5, 50].map(Fp::from)
    );
    assert_eq!(
        compare_and_swap((9, 90), (5, 50))?,
        [9u64, 90, 5, 50].map(Fp::from)
    );
    assert_eq!(
        compare_and_swap((4, 1), (4, 2))?,
        [4u64, 1, 4, 2].map(Fp::from)
    );
    Ok(())
}
