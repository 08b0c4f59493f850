//! Output heads applied on top of the class logits.

use burn::prelude::*;

/// Append the maximum auxiliary logit to the main logits as one extra channel.
///
/// `main` is `[N, C]`, `aux` is `[N, A]`; the result is `[N, C + 1]`.
pub fn open_set_scores<B: Backend>(main: Tensor<B, 2>, aux: Tensor<B, 2>) -> Tensor<B, 2> {
    let unknown = aux.max_dim(1);
    Tensor::cat(vec![main, unknown], 1)
}

/// Negative squared distance of every logit vector to each class centre.
///
/// Centre `i` is `magnitude` on channel `i` and zero elsewhere, so channel `i`
/// of the output is `-sum_c (y_c - magnitude * [c == i])^2`. Inactive cells of
/// a dense volume score `-magnitude^2` on every channel.
pub fn gaussian_centre_scores<B: Backend>(logits: Tensor<B, 5>, magnitude: f64) -> Tensor<B, 5> {
    let sq_norm = logits.clone().powf_scalar(2.0).sum_dim(1);
    logits * (2.0 * magnitude) - sq_norm - magnitude * magnitude
}
