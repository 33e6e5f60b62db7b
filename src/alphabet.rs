use std::collections::BTreeSet;

const DNA_BITMASK_A: u8 = 1;
const DNA_BITMASK_C: u8 = 2;
const DNA_BITMASK_G: u8 = 4;
const DNA_BITMASK_T: u8 = 8;

/// Extended IUPAC protein letters, including the stop-free ambiguity codes
/// B, Z, X and J and the rare residues U and O.
pub const EXTENDED_PROTEIN: &[u8] = b"ACDEFGHIKLMNPQRSTVWYBXZJUO";

/// A bitmasked nucleotide code. A code with exactly one bit set is an
/// unambiguous base.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct NucleotideCode(u8);

impl NucleotideCode {
    #[inline(always)]
    pub fn from_letter(letter: u8) -> Self {
        match letter.to_ascii_uppercase() {
            b'A' => Self(DNA_BITMASK_A),
            b'C' => Self(DNA_BITMASK_C),
            b'G' => Self(DNA_BITMASK_G),
            b'T' => Self(DNA_BITMASK_T),
            b'W' => Self(DNA_BITMASK_A | DNA_BITMASK_T),
            b'S' => Self(DNA_BITMASK_C | DNA_BITMASK_G),
            b'M' => Self(DNA_BITMASK_A | DNA_BITMASK_C),
            b'K' => Self(DNA_BITMASK_G | DNA_BITMASK_T),
            b'R' => Self(DNA_BITMASK_A | DNA_BITMASK_G),
            b'Y' => Self(DNA_BITMASK_C | DNA_BITMASK_T),
            b'B' => Self(DNA_BITMASK_C | DNA_BITMASK_G | DNA_BITMASK_T),
            b'D' => Self(DNA_BITMASK_A | DNA_BITMASK_G | DNA_BITMASK_T),
            b'H' => Self(DNA_BITMASK_A | DNA_BITMASK_C | DNA_BITMASK_T),
            b'V' => Self(DNA_BITMASK_A | DNA_BITMASK_C | DNA_BITMASK_G),
            b'N' => Self(DNA_BITMASK_A | DNA_BITMASK_C | DNA_BITMASK_G | DNA_BITMASK_T),
            _ => Self(0),
        }
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    #[inline(always)]
    pub fn is_unambiguous(&self) -> bool {
        self.0.count_ones() == 1
    }
}

/// Letters of `sequence` that are not unambiguous nucleotides, upper-cased and
/// deduplicated.
pub fn invalid_nucleotides(sequence: &str) -> BTreeSet<char> {
    sequence
        .bytes()
        .filter(|b| !NucleotideCode::from_letter(*b).is_unambiguous())
        .map(|b| b.to_ascii_uppercase() as char)
        .collect()
}

/// Letters of `translation` outside the extended protein alphabet.
pub fn invalid_amino_acids(translation: &str) -> BTreeSet<char> {
    translation
        .bytes()
        .map(|b| b.to_ascii_uppercase())
        .filter(|b| !EXTENDED_PROTEIN.contains(b))
        .map(|b| b as char)
        .collect()
}

pub fn format_letters(letters: &BTreeSet<char>) -> String {
    letters.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(", ")
}
