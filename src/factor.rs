//! Dense factors over sets of categorical variables, and their algebra.

use crate::{Assignment, Error, Result, VariableSet};
use rand::distributions::Distribution;
use rand::Rng;
use smallvec::SmallVec;
use statrs::distribution::Gamma;

type Dims = SmallVec<[usize; 4]>;

/// A dense non-negative table over a set of categorical variables.
///
/// The variable set is kept in canonical ascending order and the table is
/// laid out with the first (lowest-id) variable varying fastest:
/// `stride[0] = 1`, `stride[i] = stride[i-1] · card[i-1]`. A factor with an
/// empty scope is a scalar and acts as a constant multiplier under
/// [`product`](Factor::product).
///
/// ```
/// use cliquelearn::{factor::Factor, VariableSet};
///
/// let card = [2, 2];
/// let f = Factor::from_values(VariableSet::new(&[0]), &card, vec![1.0, 2.0]).unwrap();
/// let g = Factor::from_values(VariableSet::new(&[1]), &card, vec![3.0, 4.0]).unwrap();
/// let h = f.product(&g);
/// assert_eq!(h.vars(), &VariableSet::new(&[0, 1]));
/// assert_eq!(h.values(), &[3.0, 6.0, 4.0, 8.0]);
/// ```
#[derive(Clone, PartialEq)]
pub struct Factor {
    vars: VariableSet,
    card: Dims,
    values: Vec<f64>,
}

impl Factor {
    /// A zero table over `vars`. `card` is the global cardinality vector,
    /// indexed by variable id.
    pub fn new(vars: VariableSet, card: &[usize]) -> Factor {
        let restricted: Dims = vars.iter().map(|v| card[v]).collect();
        let len = restricted.iter().product();
        Factor {
            vars,
            card: restricted,
            values: vec![0.0; len],
        }
    }

    /// A scalar factor with an empty scope.
    pub fn scalar(value: f64) -> Factor {
        Factor {
            vars: VariableSet::empty(),
            card: SmallVec::new(),
            values: vec![value],
        }
    }

    /// A table with every entry equal to `1 / len`.
    pub fn uniform(vars: VariableSet, card: &[usize]) -> Factor {
        let mut f = Factor::new(vars, card);
        let weight = 1.0 / f.values.len() as f64;
        for v in &mut f.values {
            *v = weight;
        }
        f
    }

    /// A strictly positive random table, normalised to sum to one.
    pub fn random<R: Rng + ?Sized>(vars: VariableSet, card: &[usize], rng: &mut R) -> Factor {
        let mut f = Factor::new(vars, card);
        for v in &mut f.values {
            // gen() is [0, 1); flip to (0, 1] so no entry is exactly zero
            *v = 1.0 - rng.gen::<f64>();
        }
        let sum = f.sum();
        for v in &mut f.values {
            *v /= sum;
        }
        f
    }

    /// A strictly positive table of independent Gamma(α, 1) draws normalised
    /// to sum to one — a sample from the flat Dirichlet(α) over the table.
    pub fn dirichlet<R: Rng + ?Sized>(
        vars: VariableSet,
        card: &[usize],
        alpha: f64,
        rng: &mut R,
    ) -> Result<Factor> {
        if !(alpha > 0.0) {
            return Err(Error::InvalidArgument(format!(
                "dirichlet alpha must be positive, got {alpha}"
            )));
        }
        let gamma = Gamma::new(alpha, 1.0).map_err(|e| Error::InvalidArgument(e.to_string()))?;
        let mut f = Factor::new(vars, card);
        for v in &mut f.values {
            // small alphas underflow to 0.0 often enough to matter
            *v = gamma.sample(rng).max(f64::MIN_POSITIVE);
        }
        f.normalize()?;
        Ok(f)
    }

    /// Adopts `values` as the table over `vars`.
    ///
    /// Fails with [`Error::ShapeMismatch`] unless the length equals the
    /// product of the cardinalities of `vars`.
    pub fn from_values(vars: VariableSet, card: &[usize], values: Vec<f64>) -> Result<Factor> {
        let restricted: Dims = vars.iter().map(|v| card[v]).collect();
        let len: usize = restricted.iter().product();
        if values.len() != len {
            return Err(Error::ShapeMismatch(format!(
                "{} values for a table over {:?} with {} cells",
                values.len(),
                vars,
                len
            )));
        }
        Ok(Factor {
            vars,
            card: restricted,
            values,
        })
    }

    /// The scope of this factor.
    pub fn vars(&self) -> &VariableSet {
        &self.vars
    }

    /// The table entries, first variable fastest.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub(crate) fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    /// Cardinalities of the scope variables, aligned with the sorted order.
    pub fn cardinalities(&self) -> &[usize] {
        &self.card
    }

    /// Number of cells in the table.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Always `false`: even a scalar factor has one cell.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Sum of all table entries.
    pub fn sum(&self) -> f64 {
        self.values.iter().sum()
    }

    fn stride(&self, pos: usize) -> usize {
        self.card[..pos].iter().product()
    }

    /// Entry at `a`.
    ///
    /// # Panics
    ///
    /// Panics unless `a` ranges over exactly this factor's scope.
    pub fn get(&self, a: &Assignment) -> f64 {
        assert_eq!(&self.vars, a.vars());
        self.values[a.index()]
    }

    /// Overwrites the entry at `a`.
    ///
    /// # Panics
    ///
    /// Panics unless `a` ranges over exactly this factor's scope.
    pub fn set(&mut self, a: &Assignment, value: f64) {
        assert_eq!(&self.vars, a.vars());
        self.values[a.index()] = value;
    }

    /// Pointwise product, `H(A ∪ B)[h] = F[h|A] · G[h|B]`.
    ///
    /// The result's scope is the canonical ascending merge of both scopes and
    /// the work is linear in the size of the result: both input tables are
    /// walked with stride counters instead of re-deriving indices per cell.
    pub fn product(&self, other: &Factor) -> Factor {
        let vars = self.vars.union(&other.vars);
        let dims = vars.len();
        let mut card: Dims = SmallVec::with_capacity(dims);
        let mut stride_a: Dims = SmallVec::with_capacity(dims);
        let mut stride_b: Dims = SmallVec::with_capacity(dims);
        for v in vars.iter() {
            let pa = self.vars.position(v);
            let pb = other.vars.position(v);
            let c = pa
                .map(|p| self.card[p])
                .or_else(|| pb.map(|p| other.card[p]))
                .expect("union variable comes from one of the operands");
            card.push(c);
            stride_a.push(pa.map_or(0, |p| self.stride(p)));
            stride_b.push(pb.map_or(0, |p| other.stride(p)));
        }

        let len: usize = card.iter().product();
        let mut values = Vec::with_capacity(len);
        let mut counters: Dims = card.iter().map(|_| 0).collect();
        let (mut ia, mut ib) = (0, 0);
        for _ in 0..len {
            values.push(self.values[ia] * other.values[ib]);
            for d in 0..dims {
                counters[d] += 1;
                ia += stride_a[d];
                ib += stride_b[d];
                if counters[d] < card[d] {
                    break;
                }
                counters[d] = 0;
                ia -= stride_a[d] * card[d];
                ib -= stride_b[d] * card[d];
            }
        }
        Factor { vars, card, values }
    }

    /// Sums variable `x` out of the table. Summing out a variable that is not
    /// in the scope returns the factor unchanged.
    pub fn sum_out(&self, x: usize) -> Factor {
        let pos = match self.vars.position(x) {
            Some(pos) => pos,
            None => return self.clone(),
        };
        let stride = self.stride(pos);
        let cx = self.card[pos];

        let vars: VariableSet = self.vars.iter().filter(|&v| v != x).collect();
        let mut card = self.card.clone();
        card.remove(pos);

        let len = self.values.len() / cx;
        let mut values = Vec::with_capacity(len);
        for i in 0..len {
            let base = i % stride + (i / stride) * stride * cx;
            let mut acc = 0.0;
            for k in 0..cx {
                acc += self.values[base + k * stride];
            }
            values.push(acc);
        }
        Factor { vars, card, values }
    }

    /// Sums out every variable in `xs`.
    pub fn sum_out_all(&self, xs: &VariableSet) -> Factor {
        let mut out: Option<Factor> = None;
        for x in xs.iter() {
            out = Some(out.as_ref().unwrap_or(self).sum_out(x));
        }
        out.unwrap_or_else(|| self.clone())
    }

    /// Projects the table onto the slice consistent with `evidence`.
    ///
    /// `evidence[v]` is the observed value of variable `v`; `None` — or an id
    /// past the end of the slice, which is how hidden variables are handled —
    /// leaves the variable free. Observed dimensions are collapsed.
    ///
    /// ```
    /// use cliquelearn::{factor::Factor, VariableSet};
    ///
    /// let f = Factor::from_values(
    ///     VariableSet::new(&[0, 1]),
    ///     &[2, 2],
    ///     vec![0.1, 0.2, 0.3, 0.4],
    /// )
    /// .unwrap();
    /// let g = f.restrict(&[None, Some(1)]);
    /// assert_eq!(g.vars(), &VariableSet::new(&[0]));
    /// assert_eq!(g.values(), &[0.3, 0.4]);
    /// ```
    pub fn restrict(&self, evidence: &[Option<usize>]) -> Factor {
        let mut base = 0;
        let mut kept_vars: SmallVec<[usize; 4]> = SmallVec::new();
        let mut kept_card: Dims = SmallVec::new();
        let mut kept_stride: Dims = SmallVec::new();
        for (pos, v) in self.vars.iter().enumerate() {
            match evidence.get(v).copied().flatten() {
                Some(value) => {
                    debug_assert!(value < self.card[pos]);
                    base += value * self.stride(pos);
                }
                None => {
                    kept_vars.push(v);
                    kept_card.push(self.card[pos]);
                    kept_stride.push(self.stride(pos));
                }
            }
        }
        if kept_vars.len() == self.vars.len() {
            return self.clone();
        }

        let len: usize = kept_card.iter().product();
        let mut values = Vec::with_capacity(len);
        let mut counters: Dims = kept_card.iter().map(|_| 0).collect();
        let mut index = base;
        for _ in 0..len {
            values.push(self.values[index]);
            for d in 0..kept_vars.len() {
                counters[d] += 1;
                index += kept_stride[d];
                if counters[d] < kept_card[d] {
                    break;
                }
                counters[d] = 0;
                index -= kept_stride[d] * kept_card[d];
            }
        }
        Factor {
            vars: VariableSet::new(&kept_vars),
            card: kept_card,
            values,
        }
    }

    /// Scales the table to sum to one.
    ///
    /// A zero-sum table is left unchanged and reported as
    /// [`Error::DegeneratePotential`]; a non-finite sum is
    /// [`Error::NumericFailure`].
    pub fn normalize(&mut self) -> Result<()> {
        let sum = self.sum();
        if !sum.is_finite() {
            return Err(Error::NumericFailure);
        }
        if sum == 0.0 {
            return Err(Error::DegeneratePotential);
        }
        for v in &mut self.values {
            *v /= sum;
        }
        Ok(())
    }

    /// Adds `other` into this table index-wise. The scopes must be identical.
    pub fn add_assign_factor(&mut self, other: &Factor) -> Result<()> {
        if self.vars != other.vars {
            return Err(Error::ShapeMismatch(format!(
                "cannot add a table over {:?} into one over {:?}",
                other.vars, self.vars
            )));
        }
        for (a, b) in self.values.iter_mut().zip(&other.values) {
            *a += b;
        }
        Ok(())
    }

    /// Adds an evidence-restricted factor into the matching hyperslice of
    /// this full-scope table.
    ///
    /// `slice` must range over exactly this factor's scope minus the
    /// variables bound by `evidence`; its values land at the full-scope
    /// indices consistent with the evidence. This is the E-step accumulation
    /// primitive: cells inconsistent with the evidence receive nothing.
    pub fn add_sliced(&mut self, evidence: &[Option<usize>], slice: &Factor) -> Result<()> {
        let mut base = 0;
        let mut kept_vars: SmallVec<[usize; 4]> = SmallVec::new();
        let mut kept_card: Dims = SmallVec::new();
        let mut kept_stride: Dims = SmallVec::new();
        for (pos, v) in self.vars.iter().enumerate() {
            match evidence.get(v).copied().flatten() {
                Some(value) => base += value * self.stride(pos),
                None => {
                    kept_vars.push(v);
                    kept_card.push(self.card[pos]);
                    kept_stride.push(self.stride(pos));
                }
            }
        }
        if slice.vars.as_slice() != kept_vars.as_slice() {
            return Err(Error::ShapeMismatch(format!(
                "slice over {:?} does not match the free variables {:?}",
                slice.vars,
                VariableSet::new(&kept_vars)
            )));
        }

        let mut counters: Dims = kept_card.iter().map(|_| 0).collect();
        let mut index = base;
        for value in &slice.values {
            self.values[index] += value;
            for d in 0..kept_vars.len() {
                counters[d] += 1;
                index += kept_stride[d];
                if counters[d] < kept_card[d] {
                    break;
                }
                counters[d] = 0;
                index -= kept_stride[d] * kept_card[d];
            }
        }
        Ok(())
    }

    /// Largest pointwise absolute difference between two tables over the same
    /// scope.
    pub fn max_difference(&self, other: &Factor) -> Result<f64> {
        if self.vars != other.vars {
            return Err(Error::ShapeMismatch(format!(
                "cannot compare a table over {:?} with one over {:?}",
                other.vars, self.vars
            )));
        }
        Ok(self
            .values
            .iter()
            .zip(&other.values)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max))
    }
}

impl std::fmt::Debug for Factor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Factor")
            .field("vars", &self.vars)
            .field("values", &self.values)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const CARD: [usize; 4] = [2, 3, 2, 3];
    const EPS: f64 = 1e-9;

    fn arbitrary(vars: &[usize], rng: &mut StdRng) -> Factor {
        let vars = VariableSet::new(vars);
        let mut f = Factor::new(vars, &CARD);
        for v in f.values_mut() {
            *v = rng.gen_range(0.1..10.0);
        }
        f
    }

    #[test]
    fn product_matches_hand_computation() {
        let f = Factor::from_values(VariableSet::new(&[0, 1]), &CARD, vec![1., 2., 3., 4., 5., 6.])
            .unwrap();
        let g = Factor::from_values(VariableSet::new(&[1]), &CARD, vec![10., 20., 30.]).unwrap();
        let h = f.product(&g);
        assert_eq!(h.vars(), &VariableSet::new(&[0, 1]));
        assert_eq!(h.values(), &[10., 20., 60., 80., 150., 180.]);
    }

    #[test]
    fn product_is_commutative_and_associative() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..50 {
            let f = arbitrary(&[0, 1], &mut rng);
            let g = arbitrary(&[1, 2], &mut rng);
            let h = arbitrary(&[2, 3], &mut rng);

            let fg = f.product(&g);
            let gf = g.product(&f);
            assert_eq!(fg.vars(), gf.vars());
            assert!(fg.max_difference(&gf).unwrap() < EPS);

            let left = f.product(&g).product(&h);
            let right = f.product(&g.product(&h));
            assert!(left.max_difference(&right).unwrap() < EPS);
        }
    }

    #[test]
    fn scalar_factor_multiplies_through() {
        let f = Factor::from_values(VariableSet::new(&[0]), &CARD, vec![1.0, 2.0]).unwrap();
        let s = Factor::scalar(3.0);
        let fs = f.product(&s);
        assert_eq!(fs.values(), &[3.0, 6.0]);
        let sf = s.product(&f);
        assert_eq!(sf.values(), &[3.0, 6.0]);
    }

    #[test]
    fn sum_out_collapses_one_dimension() {
        let f = Factor::from_values(VariableSet::new(&[0, 1]), &CARD, vec![1., 2., 3., 4., 5., 6.])
            .unwrap();
        let over_0 = f.sum_out(0);
        assert_eq!(over_0.vars(), &VariableSet::new(&[1]));
        assert_eq!(over_0.values(), &[3., 7., 11.]);
        let over_1 = f.sum_out(1);
        assert_eq!(over_1.vars(), &VariableSet::new(&[0]));
        assert_eq!(over_1.values(), &[9., 12.]);
        // absent variable is a no-op
        assert_eq!(f.sum_out(3).values(), f.values());
    }

    #[test]
    fn sum_out_commutes_with_product_over_disjoint_scope() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let f = arbitrary(&[0, 1], &mut rng);
            let g = arbitrary(&[2, 3], &mut rng);
            let left = f.product(&g).sum_out(0);
            let right = f.sum_out(0).product(&g);
            assert!(left.max_difference(&right).unwrap() < 1e-8);
        }
    }

    #[test]
    fn restrict_then_sum_out_gives_evidence_mass() {
        let mut rng = StdRng::seed_from_u64(13);
        for _ in 0..50 {
            let f = arbitrary(&[0, 1, 2], &mut rng);
            let evidence = [None, Some(rng.gen_range(0..CARD[1])), Some(0)];
            let restricted = f.restrict(&evidence);

            // direct computation of the mass of the evidence slice
            let mut expected = 0.0;
            let mut a = Assignment::new(f.vars(), &CARD);
            loop {
                if a.get(1) == evidence[1] && a.get(2) == evidence[2] {
                    expected += f.get(&a);
                }
                if !a.advance() {
                    break;
                }
            }
            let total = restricted.sum_out_all(restricted.vars());
            assert!((total.values()[0] - expected).abs() < EPS);
        }
    }

    #[test]
    fn restrict_ignores_missing_and_out_of_scope_evidence() {
        let f = Factor::from_values(VariableSet::new(&[0, 1]), &CARD, vec![1., 2., 3., 4., 5., 6.])
            .unwrap();
        // evidence on a variable outside the scope leaves the factor alone
        assert_eq!(f.restrict(&[None, None, Some(1)]).values(), f.values());
        // shorter evidence than the variable range: the rest is unobserved
        assert_eq!(f.restrict(&[Some(1)]).values(), &[2., 4., 6.]);
    }

    #[test]
    fn normalize_handles_degenerate_and_healthy_tables() {
        let mut f = Factor::new(VariableSet::new(&[0]), &CARD);
        let before = f.values().to_vec();
        assert!(matches!(f.normalize(), Err(Error::DegeneratePotential)));
        assert_eq!(f.values(), &before[..]);

        let mut g =
            Factor::from_values(VariableSet::new(&[0]), &CARD, vec![1.0, 3.0]).unwrap();
        g.normalize().unwrap();
        assert!((g.sum() - 1.0).abs() < EPS);
        assert_eq!(g.values(), &[0.25, 0.75]);
    }

    #[test]
    fn add_assign_requires_matching_scope() {
        let mut f = Factor::new(VariableSet::new(&[0]), &CARD);
        let g = Factor::uniform(VariableSet::new(&[1]), &CARD);
        assert!(matches!(
            f.add_assign_factor(&g),
            Err(Error::ShapeMismatch(_))
        ));
        let h = Factor::from_values(VariableSet::new(&[0]), &CARD, vec![1.0, 2.0]).unwrap();
        f.add_assign_factor(&h).unwrap();
        assert_eq!(f.values(), &[1.0, 2.0]);
    }

    #[test]
    fn add_sliced_targets_the_evidence_slice() {
        let mut acc = Factor::new(VariableSet::new(&[0, 1]), &CARD);
        let slice = Factor::from_values(VariableSet::new(&[0]), &CARD, vec![0.3, 0.7]).unwrap();
        let evidence = [None, Some(2)];
        acc.add_sliced(&evidence, &slice).unwrap();
        assert_eq!(acc.values(), &[0., 0., 0., 0., 0.3, 0.7]);

        // a slice over the wrong variables is rejected
        let bad = Factor::from_values(VariableSet::new(&[1]), &CARD, vec![1., 1., 1.]).unwrap();
        assert!(matches!(
            acc.add_sliced(&evidence, &bad),
            Err(Error::ShapeMismatch(_))
        ));
    }

    #[test]
    fn from_values_checks_length() {
        let r = Factor::from_values(VariableSet::new(&[0, 1]), &CARD, vec![1.0; 5]);
        assert!(matches!(r, Err(Error::ShapeMismatch(_))));
    }

    #[test]
    fn random_and_dirichlet_tables_are_positive_distributions() {
        let mut rng = StdRng::seed_from_u64(99);
        let f = Factor::random(VariableSet::new(&[0, 1]), &CARD, &mut rng);
        assert!((f.sum() - 1.0).abs() < EPS);
        assert!(f.values().iter().all(|&v| v > 0.0));

        let g = Factor::dirichlet(VariableSet::new(&[0, 1]), &CARD, 0.5, &mut rng).unwrap();
        assert!((g.sum() - 1.0).abs() < EPS);
        assert!(g.values().iter().all(|&v| v > 0.0));

        assert!(Factor::dirichlet(VariableSet::new(&[0]), &CARD, 0.0, &mut rng).is_err());
    }
}
