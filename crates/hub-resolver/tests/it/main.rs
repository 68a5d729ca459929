mod memory;
mod resolver;
