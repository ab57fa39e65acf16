
mod layers;
mod random;
