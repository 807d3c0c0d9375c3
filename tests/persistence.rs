//! Saving, loading and sharing trained models.

mod common;

use std::fs;
use std::thread;

use hornvecs::{Error, HornVecs, LossKind};

use common::classifier;

const QUERIES: [&str; 4] = ["great film", "bad movie", "movie", "nothing known"];

fn same_model(a: &HornVecs, b: &HornVecs) {
    assert_eq!(a.args(), b.args());
    let (da, db) = (a.dictionary(), b.dictionary());
    assert_eq!(da.nwords(), db.nwords());
    assert_eq!(da.nlabels(), db.nlabels());
    assert_eq!(da.ntokens(), db.ntokens());
    for i in 0..da.nwords() + da.nlabels() {
        assert_eq!(da.word(i), db.word(i));
    }
    for (ma, mb) in [
        (a.model().input(), b.model().input()),
        (a.model().output(), b.model().output()),
    ] {
        assert_eq!((ma.rows(), ma.cols()), (mb.rows(), mb.cols()));
        for i in 0..ma.rows() {
            assert_eq!(ma.row_values(i), mb.row_values(i));
        }
    }
}

#[test]
fn save_and_load_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    for loss in [LossKind::Softmax, LossKind::Hs, LossKind::Ns] {
        let hv = classifier(dir.path(), loss);
        let path = dir.path().join(format!("{loss}.bin"));
        hv.save_model(&path).unwrap();

        let loaded = HornVecs::load(&path).unwrap();
        same_model(&hv, &loaded);
        assert!(loaded.summary().is_none());
        for query in QUERIES {
            assert_eq!(
                hv.predict(query, 2, 0.0).unwrap(),
                loaded.predict(query, 2, 0.0).unwrap(),
                "{loss}: {query}"
            );
        }
        assert_eq!(hv.word_vector("great"), loaded.word_vector("great"));
    }
}

#[test]
fn damaged_files_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let hv = classifier(dir.path(), LossKind::Hs);
    let path = dir.path().join("model.bin");
    hv.save_model(&path).unwrap();
    let bytes = fs::read(&path).unwrap();

    let damaged = dir.path().join("damaged.bin");
    let cases: Vec<(&str, Vec<u8>)> = vec![
        ("empty", vec![]),
        ("truncated", bytes[..bytes.len() / 2].to_vec()),
        ("no quantization flag", bytes[..bytes.len() - 1].to_vec()),
        ("bad magic", {
            let mut b = bytes.clone();
            b[0] ^= 0xff;
            b
        }),
        ("quantized", {
            let mut b = bytes.clone();
            let last = b.len() - 1;
            b[last] = 1;
            b
        }),
    ];
    for (what, contents) in cases {
        fs::write(&damaged, contents).unwrap();
        match HornVecs::load(&damaged) {
            Err(Error::Format(message)) => {
                assert!(message.contains("damaged.bin"), "{what}: {message}");
                if what == "quantized" {
                    assert!(message.contains("quantized"), "{message}");
                }
            }
            Err(other) => panic!("{what}: expected a format error, got {other}"),
            Ok(_) => panic!("{what}: loaded a damaged file"),
        }
    }
}

#[test]
fn failed_reload_keeps_the_old_model() {
    let dir = tempfile::tempdir().unwrap();
    let mut hv = classifier(dir.path(), LossKind::Softmax);
    let before = hv.predict("great film", 2, 0.0).unwrap();

    let path = dir.path().join("model.bin");
    hv.save_model(&path).unwrap();
    let bytes = fs::read(&path).unwrap();
    let truncated = dir.path().join("truncated.bin");
    fs::write(&truncated, &bytes[..bytes.len() - 10]).unwrap();

    assert!(matches!(hv.reload(&truncated), Err(Error::Format(_))));
    assert_eq!(hv.predict("great film", 2, 0.0).unwrap(), before);

    hv.reload(&path).unwrap();
    assert_eq!(hv.predict("great film", 2, 0.0).unwrap(), before);
}

#[test]
fn concurrent_predictions_agree() {
    let dir = tempfile::tempdir().unwrap();
    let hv = classifier(dir.path(), LossKind::Hs);
    let expected: Vec<_> = QUERIES
        .iter()
        .map(|q| hv.predict(q, 2, 0.0).unwrap())
        .collect();

    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..25 {
                    for (q, want) in QUERIES.iter().zip(&expected) {
                        assert_eq!(&hv.predict(q, 2, 0.0).unwrap(), want);
                    }
                    hv.nearest_neighbors("great", 2);
                }
            });
        }
    });
}
