//! Packed 2-bit page states.
//!
//! Sixteen pages share one 32-bit word, packed low bits first: page `i` lives
//! in word `i / 16` at bit offset `(i % 16) * 2`.

/// Number of pages encoded in one bitmap word.
pub const PAGES_PER_WORD: u64 = 16;

/// Cumulative page state: each level implies all lower ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum PageState {
    /// Mapped but not committed
    #[default]
    Reserved = 0,
    Committed = 1,
    Accessed = 2,
    Dirty = 3,
}

impl PageState {
    pub fn from_bits(bits: u32) -> Self {
        match bits & 0b11 {
            0 => PageState::Reserved,
            1 => PageState::Committed,
            2 => PageState::Accessed,
            _ => PageState::Dirty,
        }
    }

    pub fn bits(self) -> u32 {
        self as u32
    }

    pub fn is_committed(self) -> bool {
        self >= PageState::Committed
    }

    pub fn is_accessed(self) -> bool {
        self >= PageState::Accessed
    }

    pub fn is_dirty(self) -> bool {
        self >= PageState::Dirty
    }
}

/// Number of 32-bit words needed to hold `pages` packed states, or `None` on overflow.
pub fn bitmap_words(pages: u64) -> Option<u64> {
    Some(pages.checked_mul(2)?.div_ceil(32))
}

/// Decode the state of `page` from a packed bitmap.
///
/// Pages past the end of `words` read as [`PageState::Reserved`].
pub fn page_state(words: &[u32], page: u64) -> PageState {
    let Some(word) = usize::try_from(page / PAGES_PER_WORD)
        .ok()
        .and_then(|i| words.get(i))
    else {
        return PageState::Reserved;
    };
    PageState::from_bits(*word >> ((page % PAGES_PER_WORD) * 2))
}

/// Store `state` for `page`, growing `words` as needed.
///
/// Returns `false`, leaving `words` untouched, when the bitmap cannot grow to
/// reach `page` on this target.
pub fn set_page_state(words: &mut Vec<u32>, page: u64, state: PageState) -> bool {
    let Some(len) = usize::try_from(page / PAGES_PER_WORD)
        .ok()
        .and_then(|index| index.checked_add(1))
    else {
        return false;
    };
    if words.len() < len {
        if words.try_reserve_exact(len - words.len()).is_err() {
            return false;
        }
        words.resize(len, 0);
    }
    let index = len - 1;
    let shift = (page % PAGES_PER_WORD) * 2;
    words[index] = (words[index] & !(0b11 << shift)) | (state.bits() << shift);
    true
}

/// Pack a sequence of states into bitmap words.
pub fn pack_states(states: &[PageState]) -> Vec<u32> {
    let mut words = vec![0; bitmap_words(states.len() as u64).unwrap_or(0) as usize];
    for (page, &state) in states.iter().enumerate() {
        set_page_state(&mut words, page as u64, state);
    }
    words
}
