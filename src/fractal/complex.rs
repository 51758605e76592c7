//! Noyau arithmétique complexe utilisé par toutes les formules.
//!
//! Les fonctions sont génériques sur le flottant (`f64` pour la précision
//! haute, `f32` pour les précisions moyenne et basse) et travaillent sur
//! `num_complex::Complex<T>`, qui est une valeur immuable (`Copy`).

use num_complex::Complex;
use num_traits::Float;

/// a + b
#[inline]
pub fn add<T: Float>(a: Complex<T>, b: Complex<T>) -> Complex<T> {
    Complex::new(a.re + b.re, a.im + b.im)
}

/// Produit complexe standard.
#[inline]
pub fn multiply<T: Float>(a: Complex<T>, b: Complex<T>) -> Complex<T> {
    Complex::new(a.re * b.re - a.im * b.im, a.re * b.im + a.im * b.re)
}

/// z², en trois multiplications au lieu de quatre.
#[inline]
pub fn square<T: Float>(z: Complex<T>) -> Complex<T> {
    let two = T::one() + T::one();
    Complex::new((z.re + z.im) * (z.re - z.im), two * z.re * z.im)
}

/// re² + im², à préférer à `magnitude` pour les tests d'échappement.
#[inline]
pub fn magnitude_squared<T: Float>(z: Complex<T>) -> T {
    z.re * z.re + z.im * z.im
}

#[inline]
pub fn magnitude<T: Float>(z: Complex<T>) -> T {
    magnitude_squared(z).sqrt()
}

/// (|re|, |im|), utilisé par la famille Burning Ship.
#[inline]
pub fn absolute<T: Float>(z: Complex<T>) -> Complex<T> {
    Complex::new(z.re.abs(), z.im.abs())
}

#[inline]
pub fn conjugate<T: Float>(z: Complex<T>) -> Complex<T> {
    Complex::new(z.re, -z.im)
}

/// Multiplie par un scalaire réel.
#[inline]
pub fn scale<T: Float>(z: Complex<T>, k: T) -> Complex<T> {
    Complex::new(z.re * k, z.im * k)
}

/// a / b. Renvoie NaN/Inf si b est nul, comme la division flottante.
#[inline]
pub fn divide<T: Float>(a: Complex<T>, b: Complex<T>) -> Complex<T> {
    let denom = magnitude_squared(b);
    Complex::new(
        (a.re * b.re + a.im * b.im) / denom,
        (a.im * b.re - a.re * b.im) / denom,
    )
}

#[inline]
pub fn is_finite<T: Float>(z: Complex<T>) -> bool {
    z.re.is_finite() && z.im.is_finite()
}

/// Conversion d'un complexe f64 vers la précision de calcul.
#[inline]
pub fn cast<T: Float>(z: Complex<f64>) -> Complex<T> {
    Complex::new(
        T::from(z.re).unwrap_or_else(T::nan),
        T::from(z.im).unwrap_or_else(T::nan),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;

    #[test]
    fn test_square_matches_multiply() {
        let samples = [
            Complex64::new(0.0, 0.0),
            Complex64::new(1.5, -0.25),
            Complex64::new(-0.7269, 0.1889),
            Complex64::new(3.0, 4.0),
        ];
        for z in samples {
            let a = square(z);
            let b = multiply(z, z);
            assert!((a.re - b.re).abs() < 1e-12);
            assert!((a.im - b.im).abs() < 1e-12);
        }
    }

    #[test]
    fn test_magnitude() {
        let z = Complex64::new(3.0, -4.0);
        assert_eq!(magnitude_squared(z), 25.0);
        assert_eq!(magnitude(z), 5.0);
    }

    #[test]
    fn test_absolute_and_conjugate() {
        let z = Complex64::new(-1.0, -2.0);
        assert_eq!(absolute(z), Complex64::new(1.0, 2.0));
        assert_eq!(conjugate(z), Complex64::new(-1.0, 2.0));
    }

    #[test]
    fn test_overflow_is_tolerated() {
        let big = Complex64::new(1e200, 1e200);
        let z = square(big);
        assert!(!is_finite(z) || magnitude_squared(z).is_infinite());
        // Infini reste strictement supérieur à tout rayon d'échappement fini.
        assert!(magnitude_squared(Complex64::new(f64::INFINITY, 0.0)) > 64.0);
    }

    #[test]
    fn test_divide() {
        let a = Complex64::new(1.0, 2.0);
        let b = Complex64::new(3.0, -1.0);
        let q = divide(a, b);
        let expected = a / b;
        assert!((q.re - expected.re).abs() < 1e-12);
        assert!((q.im - expected.im).abs() < 1e-12);
    }
}
