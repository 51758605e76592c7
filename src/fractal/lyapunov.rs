//! Fractale de Lyapunov.
//!
//! Calcule l'exposant de Lyapunov de la carte logistique x_{n+1} = r * x * (1 - x)
//! où r alterne entre a et b (séquence « AB »). Le point échantillonné du plan
//! sert directement de couple (a, b) = (re, im). L'état est un réel, pas un
//! complexe.

use num_traits::Float;

use crate::fractal::formulas::EscapeValue;

/// Valeur renvoyée quand r sort de (0, 4) ou x de (0, 1).
pub const LYAPUNOV_SENTINEL: f64 = -10.0;

const START_X: f64 = 0.5;
const MIN_DERIV: f64 = 1e-10;
/// Taille des blocs de produit avant passage au logarithme.
const BLOCK_SIZE: u32 = 64;
/// En dessous, le bloc est vidé avant le prochain facteur (au moins
/// MIN_DERIV) pour que le produit reste un flottant normal.
const MIN_PRODUCT: f64 = f64::MIN_POSITIVE / MIN_DERIV;

/// Exposant moyen `mean(log|r(1 - 2x)|)` sur `iterations` pas.
pub fn lyapunov_exponent<T: Float>(a: T, b: T, iterations: u32) -> EscapeValue {
    let a = a.to_f64().unwrap_or(f64::NAN);
    let b = b.to_f64().unwrap_or(f64::NAN);

    let r_valid = |r: f64| r > 0.0 && r < 4.0;
    if !r_valid(a) || !r_valid(b) || iterations == 0 {
        return EscapeValue::Lyapunov(LYAPUNOV_SENTINEL);
    }

    let mut x = START_X;
    let mut lyap = 0.0;
    // Produit par blocs: un log tous les BLOCK_SIZE pas au lieu d'un par pas.
    let mut product = 1.0;
    let mut count_in_block = 0u32;

    for n in 0..iterations {
        let r = if n % 2 == 0 { a } else { b };
        x = r * x * (1.0 - x);
        if !(x > 0.0 && x < 1.0) {
            return EscapeValue::Lyapunov(LYAPUNOV_SENTINEL);
        }

        let deriv = (r * (1.0 - 2.0 * x)).abs().max(MIN_DERIV);
        product *= deriv;
        count_in_block += 1;

        if count_in_block >= BLOCK_SIZE || product < MIN_PRODUCT {
            lyap += product.ln();
            product = 1.0;
            count_in_block = 0;
        }
    }

    if count_in_block > 0 {
        lyap += product.ln();
    }

    EscapeValue::Lyapunov(lyap / iterations as f64)
}

/// Ramène un exposant vers [0, 1] pour la colorisation.
///
/// - exposants négatifs (stabilité) -> [0, 0.85)
/// - exposants positifs (chaos) -> [0.85, 1.0]
pub fn normalize_lyapunov(lyap: f64) -> f64 {
    if lyap < 0.0 {
        let t = (-lyap).min(2.0);
        (t / 2.0) * 0.85
    } else {
        let t = lyap.min(1.0);
        0.85 + t * 0.15
    }
}
