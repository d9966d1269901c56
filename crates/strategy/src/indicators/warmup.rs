use ta::Next;

/// Masks a `ta` indicator's output with NaN until `period` inputs were seen.
///
/// `ta` averages over whatever history it has during warm-up; callers here
/// need "undefined" instead of a partial-window value.
pub(crate) struct Warmup<I> {
    inner: I,
    period: usize,
    seen: usize,
}

impl<I> Warmup<I> {
    pub(crate) fn new(inner: I, period: usize) -> Self {
        Self {
            inner,
            period,
            seen: 0,
        }
    }

    pub(crate) fn is_warm(&self) -> bool {
        self.seen >= self.period
    }
}

impl<I> Warmup<I>
where
    I: Next<f64>,
{
    pub(crate) fn next(&mut self, input: f64) -> Option<I::Output> {
        self.seen += 1;
        let out = self.inner.next(input);
        self.is_warm().then_some(out)
    }
}
