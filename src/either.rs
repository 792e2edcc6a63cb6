//! A minimal `Left`/`Right` sum type used at the runtime boundary
//! (`safeRunEither`) and by [`crate::effect::Effect::absolve`].

/// `Left(L) | Right(R)`. By convention (inherited from the effect
/// algebra's error/success split) `Left` carries a failure and `Right` a
/// success, but the type itself carries no such bias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Either<L, R> {
    Left(L),
    Right(R),
}

impl<L, R> Either<L, R> {
    pub fn is_left(&self) -> bool {
        matches!(self, Either::Left(_))
    }

    pub fn is_right(&self) -> bool {
        matches!(self, Either::Right(_))
    }

    pub fn left(self) -> Option<L> {
        match self {
            Either::Left(l) => Some(l),
            Either::Right(_) => None,
        }
    }

    pub fn right(self) -> Option<R> {
        match self {
            Either::Left(_) => None,
            Either::Right(r) => Some(r),
        }
    }

    pub fn fold<T, OnLeft, OnRight>(self, on_left: OnLeft, on_right: OnRight) -> T
    where
        OnLeft: FnOnce(L) -> T,
        OnRight: FnOnce(R) -> T,
    {
        match self {
            Either::Left(l) => on_left(l),
            Either::Right(r) => on_right(r),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_dispatches_by_side() {
        let left: Either<&str, i32> = Either::Left("boom");
        assert_eq!(left.fold(|e| format!("err:{e}"), |a| format!("ok:{a}")), "err:boom");

        let right: Either<&str, i32> = Either::Right(7);
        assert_eq!(right.fold(|e| format!("err:{e}"), |a| format!("ok:{a}")), "ok:7");
    }

    #[test]
    fn is_left_and_is_right_agree_with_the_variant() {
        let left: Either<&str, i32> = Either::Left("x");
        assert!(left.is_left());
        assert!(!left.is_right());
    }
}
