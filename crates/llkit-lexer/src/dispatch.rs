use crate::{pattern::FirstChars, token::TokenTypeId};

const ASCII_BUCKETS: u32 = 128;
// every non-ascii bucket covers this many code points
const WIDE_BUCKET_SHIFT: u32 = 10;
const BUCKET_COUNT: usize = (ASCII_BUCKETS + (char::MAX as u32 >> WIDE_BUCKET_SHIFT) + 1) as usize;

pub fn bucket(c: char) -> usize {
    let code = c as u32;
    if code < ASCII_BUCKETS {
        code as usize
    } else {
        (ASCII_BUCKETS + (code >> WIDE_BUCKET_SHIFT)) as usize
    }
}

/// First character dispatch table of one lexer mode.
///
/// Each bucket lists the token types which can start with a character of the bucket, in
/// declaration order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchTable {
    buckets: Vec<Vec<TokenTypeId>>,
}

impl DispatchTable {
    pub fn build<'a>(patterns: impl IntoIterator<Item = (TokenTypeId, &'a FirstChars)>) -> Self {
        let mut buckets = vec![Vec::new(); BUCKET_COUNT];

        for (handle, first) in patterns {
            match first {
                FirstChars::Any => {
                    for bucket in &mut buckets {
                        bucket.push(handle);
                    }
                }
                FirstChars::Ranges(ranges) => {
                    for &(start, end) in ranges {
                        for index in bucket(start)..=bucket(end) {
                            let bucket = &mut buckets[index];
                            // overlapping ranges of one pattern
                            if bucket.last() != Some(&handle) {
                                bucket.push(handle);
                            }
                        }
                    }
                }
            }
        }

        Self { buckets }
    }

    pub fn candidates(&self, c: char) -> &[TokenTypeId] {
        &self.buckets[bucket(c)]
    }
}

#[cfg(test)]
mod tests {
    use cranelift_entity::EntityRef;

    use super::*;

    #[test]
    fn test_buckets() {
        assert_eq!(bucket('a'), 'a' as usize);
        assert_eq!(bucket('\u{7f}'), 127);
        assert_eq!(bucket('\u{80}'), 128);
        assert_eq!(bucket('\u{3ff}'), 128);
        assert_eq!(bucket('\u{400}'), 129);
        assert_eq!(bucket(char::MAX), BUCKET_COUNT - 1);
    }

    #[test]
    fn test_declaration_order() {
        let a = TokenTypeId::new(1);
        let b = TokenTypeId::new(2);
        let c = TokenTypeId::new(3);

        let first_a = FirstChars::Ranges(vec![('a', 'c'), ('b', 'b')]);
        let first_b = FirstChars::Ranges(vec![('b', 'b'), ('ж', 'ж')]);
        let first_c = FirstChars::Any;

        let table = DispatchTable::build([(a, &first_a), (b, &first_b), (c, &first_c)]);

        assert_eq!(table.candidates('a'), &[a, c]);
        assert_eq!(table.candidates('b'), &[a, b, c]);
        assert_eq!(table.candidates('ж'), &[b, c]);
        assert_eq!(table.candidates('z'), &[c]);
    }
}
