/// Given the reference-on-reference operator impl, generate the three
/// owned/borrowed combinations.
macro_rules! std_ops_gen {
    ($lty:ident, $class:ident, $rty:ident, $out:ident, $f:ident) => {
        impl<'a> $class<&'a $rty> for $lty {
            type Output = $out;

            fn $f(self, other: &'a $rty) -> $out {
                (&self).$f(other)
            }
        }

        impl<'a> $class<$rty> for &'a $lty {
            type Output = $out;

            fn $f(self, other: $rty) -> $out {
                self.$f(&other)
            }
        }

        impl $class<$rty> for $lty {
            type Output = $out;

            fn $f(self, other: $rty) -> $out {
                (&self).$f(&other)
            }
        }
    };
}
