pub mod bamboo;
