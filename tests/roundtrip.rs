use proptest::collection::vec;
use proptest::prelude::*;

fn round_trip(data: &[u8]) -> Vec<u8> {
    let compressed = ebcomp::encode(data).unwrap();
    ebcomp::decode(&compressed[..]).unwrap()
}

/// Inputs built from pieces that each strategy can match
fn structured() -> impl Strategy<Value = Vec<u8>> {
    let piece = prop_oneof![
        (any::<u8>(), 1..80usize).prop_map(|(b, n)| vec![b; n]),
        (any::<u8>(), 1..80usize).prop_map(|(b, n)| (0..n).map(|k| b.wrapping_add(k as u8)).collect()),
        (any::<[u8; 2]>(), 1..60usize).prop_map(|(w, n)| w.iter().copied().cycle().take(n * 2).collect()),
        vec(0..4u8, 1..40),
        vec(any::<u8>(), 1..20),
    ];
    vec(piece, 0..24).prop_map(|pieces| {
        let mut out: Vec<u8> = Vec::new();
        for (i, piece) in pieces.into_iter().enumerate() {
            out.extend(piece);
            // echo earlier output forward, backward, and bit reversed
            if out.len() > 8 {
                let from = i * 7 % (out.len() - 8);
                let echo: Vec<u8> = match i % 3 {
                    0 => out[from..from + 8].to_vec(),
                    1 => out[from..from + 8].iter().rev().copied().collect(),
                    _ => out[from..from + 8].iter().map(|b| b.reverse_bits()).collect(),
                };
                out.extend(echo);
            }
        }
        out
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn random_bytes_round_trip(data in vec(any::<u8>(), 0..1024)) {
        prop_assert_eq!(round_trip(&data), data);
    }

    #[test]
    fn structured_bytes_round_trip(data in structured()) {
        prop_assert_eq!(round_trip(&data), data);
    }

    #[test]
    fn small_alphabet_round_trip(data in vec(0..3u8, 0..4096)) {
        prop_assert_eq!(round_trip(&data), data);
    }
}
