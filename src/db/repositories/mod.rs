mod locks;
mod submissions;
