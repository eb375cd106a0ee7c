use proptest::prelude::*;

use taxoniq::accession::pack_id;
use taxoniq::twobit::{encode, TwoBitDecoder};

proptest! {
    #[test]
    fn twobit_roundtrip(bases in proptest::collection::vec(
        prop::sample::select(vec![b'A', b'C', b'G', b'T']),
        0..512,
    )) {
        let packed = encode(&bases).unwrap();
        let mut decoder = TwoBitDecoder::new(bases.len() as u64);
        prop_assert_eq!(decoder.decompress(&packed), bases);
        prop_assert!(decoder.is_complete());
    }

    #[test]
    fn twobit_chunking_is_irrelevant(
        bases in proptest::collection::vec(
            prop::sample::select(vec![b'A', b'C', b'G', b'T']),
            1..512,
        ),
        split in 0usize..128,
    ) {
        let packed = encode(&bases).unwrap();
        let split = split.min(packed.len());
        let mut decoder = TwoBitDecoder::new(bases.len() as u64);
        let mut decoded = decoder.decompress(&packed[..split]);
        decoded.extend(decoder.decompress(&packed[split..]));
        prop_assert_eq!(decoded, bases);
    }

    #[test]
    fn packing_is_idempotent(id in "[A-Z]{1,2}_?[0-9]{4,8}(\\.[0-9])?") {
        prop_assert_eq!(pack_id(&pack_id(&id)), pack_id(&id));
    }

    #[test]
    fn packed_ids_have_no_underscores(id in "[A-Z]{1,2}_?[0-9]{4,8}(\\.[0-9])?") {
        prop_assert!(!pack_id(&id).contains('_'));
    }
}
