mod ttl;
